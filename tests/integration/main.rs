//! Integration tests for avg-scalper

mod common;
mod config_test;
mod property_test;
mod runner_test;
mod scenario_test;
