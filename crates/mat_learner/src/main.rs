//! Thin CLI entry point: loads a config file, builds the configured Teacher
//! Adapter, and runs the Learner Loop to completion.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info};

use mat_learner::config::{load_config, Config, LearnerMode};
use mat_learner::learner::Learner;
use mat_learner::teacher::http::HttpTeacher;
use mat_learner::teacher::human::HumanTeacher;
use mat_learner::teacher::TeacherAdapter;

const DEFAULT_CONFIG_PATH: &str = "./config.json";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let config_path = env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, path = %config_path.display(), "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "learner loop terminated with an error");
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> Result<(), mat_learner::error::LearnerError> {
    let alphabet = config.alphabet_symbols();
    let teacher: Box<dyn TeacherAdapter> = match config.learner_mode {
        LearnerMode::Automatic => {
            let mut http = HttpTeacher::new(&config.server_address, &config.server_port, &config.epsilon, HTTP_TIMEOUT)?;
            let params = http.configure_mode(config.mat_mode.into())?;
            info!(?params, "configured automatic MAT mode");
            Box::new(http)
        }
        LearnerMode::Manual => Box::new(HumanTeacher::on_stdio(config.epsilon.clone())),
    };

    let mut learner = Learner::new(alphabet, teacher);
    learner.learn()?;

    let table = learner.table();
    info!(
        main_prefixes = table.main_prefixes().len(),
        suffixes = table.suffixes().count(),
        "learning complete"
    );
    Ok(())
}
