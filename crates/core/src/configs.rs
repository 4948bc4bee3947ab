//! Configuration parsing
//!
//! Flows can be configured from an optional `taskmill.yml` file.

pub mod flow;

pub use flow::{
    flow_config_schema, load_flow_config, parse_flow_config, FlowConfig, CONFIG_FILE_NAME,
};
