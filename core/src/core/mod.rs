//! Numeric primitives: unit conversions and payment references

pub mod reference;
pub mod units;
