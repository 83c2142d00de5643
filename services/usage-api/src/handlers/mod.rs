//! HTTP request handlers for the usage API.

pub mod capacity;
pub mod city;
pub mod export;
pub mod health;
pub mod patterns;
pub mod records;
pub mod stations;
pub mod summary;
pub mod timeseries;
