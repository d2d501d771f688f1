//! Integration tests for the host PDR exchange

mod support;

mod cli_replay;
mod config_integration;
mod fetch_cycle;
mod merge_tree;
mod sensor_events;
