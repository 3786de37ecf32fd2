use std::collections::HashMap;

use crate::types::{ModuleSchema, ParamsValidator, SampleableConstructor};

pub mod clocks;
pub mod seq;
pub mod utilities;
pub mod utils;

pub fn get_constructors() -> HashMap<String, SampleableConstructor> {
    let mut map = HashMap::new();
    clocks::install_constructors(&mut map);
    seq::install_constructors(&mut map);
    utilities::install_constructors(&mut map);
    map
}

/// Returns a map of `module_type` -> typed params validator.
///
/// A typed params validator attempts to deserialize a module's params JSON
/// into that module's concrete `*Params` struct.
pub fn get_param_validators() -> HashMap<String, ParamsValidator> {
    let mut map = HashMap::new();
    clocks::install_param_validators(&mut map);
    seq::install_param_validators(&mut map);
    utilities::install_param_validators(&mut map);
    map
}

pub fn schema() -> Vec<ModuleSchema> {
    [
        clocks::schemas(),
        seq::schemas(),
        utilities::schemas(),
    ]
    .concat()
}
