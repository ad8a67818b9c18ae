//! sake-lib: content-hash driven workflow builds.
//!
//! The pipeline for one invocation:
//! - `sakefile`: parse the workflow file into targets
//! - `graph`: validate targets into an acyclic dependency graph
//! - `staleness`: decide which targets are locally out of date
//! - `schedule`: expand to dependents and order the plan
//! - `execute`: run the plan and record fingerprints in the `hashstore`

pub mod consts;
pub mod execute;
pub mod graph;
pub mod hashstore;
pub mod sakefile;
pub mod schedule;
pub mod staleness;
pub mod util;
