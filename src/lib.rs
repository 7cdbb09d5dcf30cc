//! Onboard Bot — conversational onboarding for a community chat server.

pub mod bot;
pub mod config;
pub mod error;
pub mod onboarding;
pub mod platform;
pub mod scheduler;
