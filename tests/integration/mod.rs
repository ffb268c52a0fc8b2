//! Integration tests for the graphcache client data layer

mod config_loading;
mod offline_queue;
mod test_utils;
