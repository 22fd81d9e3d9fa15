//! Integration tests for the subspace-uq library
//!
//! These tests check the linear algebra contracts the subspace algorithms rely
//! on, and reduced models driven through the sampling interface.

pub mod linear_algebra;
pub mod reduced_model;
