//! Step definitions for Cucumber scenarios.

mod bridge_steps;
