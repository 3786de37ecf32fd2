use std::collections::HashMap;

use crate::types::{Module, ModuleSchema, ParamsValidator, SampleableConstructor};

pub mod pete;
pub mod snap;
pub mod timothy;
pub mod tom;

pub fn install_constructors(map: &mut HashMap<String, SampleableConstructor>) {
    pete::Pete::install_constructor(map);
    snap::Snap::install_constructor(map);
    timothy::Timothy::install_constructor(map);
    tom::Tom::install_constructor(map);
}

pub fn install_param_validators(map: &mut HashMap<String, ParamsValidator>) {
    pete::Pete::install_params_validator(map);
    snap::Snap::install_params_validator(map);
    timothy::Timothy::install_params_validator(map);
    tom::Tom::install_params_validator(map);
}

pub fn schemas() -> Vec<ModuleSchema> {
    vec![
        pete::Pete::get_schema(),
        snap::Snap::get_schema(),
        timothy::Timothy::get_schema(),
        tom::Tom::get_schema(),
    ]
}
