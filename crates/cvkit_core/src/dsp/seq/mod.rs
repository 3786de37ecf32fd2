use std::collections::HashMap;

use crate::types::{Module, ModuleSchema, ParamsValidator, SampleableConstructor};

pub mod renick;
pub mod renick_gate;
pub mod word;

pub fn install_constructors(map: &mut HashMap<String, SampleableConstructor>) {
    renick::Renick::install_constructor(map);
    renick_gate::RenickGate::install_constructor(map);
}

pub fn install_param_validators(map: &mut HashMap<String, ParamsValidator>) {
    renick::Renick::install_params_validator(map);
    renick_gate::RenickGate::install_params_validator(map);
}

pub fn schemas() -> Vec<ModuleSchema> {
    vec![
        renick::Renick::get_schema(),
        renick_gate::RenickGate::get_schema(),
    ]
}
