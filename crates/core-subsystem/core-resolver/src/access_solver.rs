// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use core_model::AccessExpression;
use serde_json::Value;

use crate::context::Identity;

/// Solve access control logic against what is known about the caller.
pub trait AccessSolver {
    fn is_authenticated(&self) -> bool;

    fn has_role(&self, role: &str) -> bool;

    fn extract_claim(&self, claim: &str) -> Option<&Value>;

    /// Whether `expr` grants access. Unknown claims never match.
    fn solve(&self, expr: &AccessExpression) -> bool {
        match expr {
            AccessExpression::BooleanLiteral(value) => *value,
            AccessExpression::Authenticated => self.is_authenticated(),
            AccessExpression::Role(role) => self.has_role(role),
            AccessExpression::ClaimEq { claim, value } => {
                self.extract_claim(claim) == Some(value)
            }
            AccessExpression::Not(underlying) => !self.solve(underlying),
            AccessExpression::And(left, right) => self.solve(left) && self.solve(right),
            AccessExpression::Or(left, right) => self.solve(left) || self.solve(right),
        }
    }
}

impl AccessSolver for Identity {
    fn is_authenticated(&self) -> bool {
        Identity::is_authenticated(self)
    }

    fn has_role(&self, role: &str) -> bool {
        Identity::has_role(self, role)
    }

    fn extract_claim(&self, claim: &str) -> Option<&Value> {
        self.claim(claim)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn solves_combined_expressions() {
        let admin_of_acme = AccessExpression::role("admin")
            .and(AccessExpression::claim_eq("tenant", "acme"));
        let public = AccessExpression::BooleanLiteral(true);

        let anonymous = Identity::anonymous();
        let alice = Identity::authenticated("alice")
            .with_role("admin")
            .with_claim("tenant", json!("acme"));
        let bob = Identity::authenticated("bob").with_claim("tenant", json!("globex"));

        assert!(anonymous.solve(&public));
        assert!(!anonymous.solve(&AccessExpression::Authenticated));
        assert!(anonymous.solve(&!AccessExpression::Authenticated));

        assert!(alice.solve(&admin_of_acme));
        assert!(!bob.solve(&admin_of_acme));
        assert!(bob.solve(&admin_of_acme.clone().or(AccessExpression::Authenticated)));
    }
}
