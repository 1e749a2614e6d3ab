#![allow(dead_code)]

pub mod bridge;
