pub mod client;
pub mod graphql;

pub use client::{SubmissionClient, SubmissionError};
pub use graphql::{GraphqlRequest, GraphqlResponse};
