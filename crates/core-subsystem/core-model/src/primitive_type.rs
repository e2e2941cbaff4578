// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde::{Deserialize, Serialize};

/// The scalars every schema starts with, plus a catch-all for user-declared scalars (whose values
/// are passed through unchecked).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarKind {
    Int,
    Float,
    String,
    Boolean,
    Id,
    Custom,
}

impl ScalarKind {
    pub const BUILT_INS: [ScalarKind; 5] = [
        ScalarKind::Int,
        ScalarKind::Float,
        ScalarKind::String,
        ScalarKind::Boolean,
        ScalarKind::Id,
    ];

    pub fn name(&self) -> Option<&'static str> {
        match self {
            ScalarKind::Int => Some("Int"),
            ScalarKind::Float => Some("Float"),
            ScalarKind::String => Some("String"),
            ScalarKind::Boolean => Some("Boolean"),
            ScalarKind::Id => Some("ID"),
            ScalarKind::Custom => None,
        }
    }
}
