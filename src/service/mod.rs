//! CrudService: the per-action request pipeline, plus field validators.

mod crud;
mod validation;
pub use crud::{page_from_params, parse_id, shape_body, CrudService, ListQuery, UpdateOutcome};
pub use validation::{
    email, required, validate, validator, EntityData, ValidationError, ValidationResult, Validator, ValidatorsMap,
};
