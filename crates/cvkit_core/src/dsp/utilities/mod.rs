use std::collections::HashMap;

use crate::types::{Module, ModuleSchema, ParamsValidator, SampleableConstructor};

pub mod chance;
pub mod dummy;
pub mod holdme;
pub mod polyamory;

pub fn install_constructors(map: &mut HashMap<String, SampleableConstructor>) {
    chance::Chance::install_constructor(map);
    dummy::Dummy::install_constructor(map);
    holdme::Holdme::install_constructor(map);
    polyamory::Polyamory::install_constructor(map);
}

pub fn install_param_validators(map: &mut HashMap<String, ParamsValidator>) {
    chance::Chance::install_params_validator(map);
    dummy::Dummy::install_params_validator(map);
    holdme::Holdme::install_params_validator(map);
    polyamory::Polyamory::install_params_validator(map);
}

pub fn schemas() -> Vec<ModuleSchema> {
    vec![
        chance::Chance::get_schema(),
        dummy::Dummy::get_schema(),
        holdme::Holdme::get_schema(),
        polyamory::Polyamory::get_schema(),
    ]
}
