/*
An implementation of Angluin's L* algorithm for active automata learning, as
described in the paper "Learning Regular Sets from Queries and
Counterexamples".
https://people.eecs.berkeley.edu/~dawnsong/teaching/s10/papers/angluin87.pdf
 */

pub mod cache;
pub mod cell;
pub mod config;
pub mod error;
pub mod heuristic;
pub mod learner;
pub mod table;
pub mod teacher;
pub mod word;
