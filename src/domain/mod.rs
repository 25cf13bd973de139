// Domain layer - Core composition types and timeline rules

pub mod errors;
pub mod model;
pub mod rules;
