//! Turns a software requirements document into a scaffolded backend project:
//! a linear model-driven extraction pipeline, a project tree materializer,
//! an iterative Python code refiner and an HTTP surface.

pub mod clients;
pub mod contexts;
pub mod data;
pub mod server;
pub mod settings;
