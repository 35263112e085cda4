//! Core model primitives shared by the server and the participants.
//!
pub mod learner;
pub mod model;

pub use self::{
    learner::{LearnerError, Logistic},
    model::Model,
};
