//! End-to-end scenarios for the service controller.
//!
//! Each case builds a temp installation, drives the controller through a fake process
//! table and a scripted installer, and checks what ends up on disk and in the status.

mod cases_app_test;
mod cases_rollout_test;

pub mod support;
