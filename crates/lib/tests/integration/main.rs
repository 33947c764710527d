//! Cross-module scenarios for wdeploy-lib.

mod common;
mod deploy_tests;
mod pipeline_tests;
