//! Local image and video generation against a ComfyUI server.

pub mod cli;
pub mod commands;
pub mod comfy;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod locator;
pub mod orchestrator;
pub mod tracker;
pub mod ui;
pub mod workflow;
