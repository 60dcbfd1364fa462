// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loan-options payloads used by the CLI, the gateway and the tests.
//!
//! Field names follow the PascalCase JSON the existing producers emit.

use serde::{Deserialize, Serialize};

/// Loan-options request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetLoanOptionsRequest {
    #[serde(default)]
    pub id: i32,
    pub credit_score: i32,
}

impl GetLoanOptionsRequest {
    pub fn new(id: i32, credit_score: i32) -> Self {
        Self { id, credit_score }
    }
}

/// Loan-options response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetLoanOptionsResponse {
    pub provider: String,
    pub loan_amount: i32,
}

/// Handler quoting `CreditScore * 4` under `provider`.
pub fn quote(
    provider: impl Into<String>,
) -> impl Fn(GetLoanOptionsRequest) -> GetLoanOptionsResponse + Clone + Send + Sync + 'static {
    let provider = provider.into();
    move |request: GetLoanOptionsRequest| GetLoanOptionsResponse {
        provider: provider.clone(),
        loan_amount: request.credit_score.saturating_mul(4),
    }
}
