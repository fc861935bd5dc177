//! AWS provider for kubeprov
//!
//! Plans EC2 instance creation and executes it through `aws-sdk-ec2`.
//! The security group and subnet are expected to exist already; AWS plans
//! contain no network steps.

pub mod ec2;
pub mod error;
pub mod plan;

pub use ec2::{Ec2Backend, record_from_instance};
pub use error::AwsError;
pub use plan::AwsPlanBuilder;
