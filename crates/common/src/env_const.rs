// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::environment::{EnvError, Environment, get_parsed};

pub const EXO_LOG: &str = "EXO_LOG";

pub const EXO_MAX_QUERY_DEPTH: &str = "EXO_MAX_QUERY_DEPTH";
pub const EXO_LOADER_MAX_BATCH_SIZE: &str = "EXO_LOADER_MAX_BATCH_SIZE";

pub const EXO_SUBSCRIPTION_BUFFER_SIZE: &str = "EXO_SUBSCRIPTION_BUFFER_SIZE";
// "buffer" (default), "drop-oldest" or "drop-newest"
pub const EXO_SUBSCRIPTION_OVERFLOW: &str = "EXO_SUBSCRIPTION_OVERFLOW";

pub const DEFAULT_MAX_QUERY_DEPTH: usize = 32;
pub const DEFAULT_SUBSCRIPTION_BUFFER_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowMode {
    Buffer,
    DropOldest,
    DropNewest,
}

pub fn get_max_query_depth(env: &dyn Environment) -> Result<usize, EnvError> {
    Ok(get_parsed(env, EXO_MAX_QUERY_DEPTH)?.unwrap_or(DEFAULT_MAX_QUERY_DEPTH))
}

/// `None` means batches are not split.
pub fn get_loader_max_batch_size(env: &dyn Environment) -> Result<Option<usize>, EnvError> {
    Ok(get_parsed::<usize>(env, EXO_LOADER_MAX_BATCH_SIZE)?.filter(|size| *size > 0))
}

pub fn get_subscription_buffer_size(env: &dyn Environment) -> Result<usize, EnvError> {
    match get_parsed::<usize>(env, EXO_SUBSCRIPTION_BUFFER_SIZE)? {
        Some(0) => Err(EnvError::InvalidEnum {
            env_key: EXO_SUBSCRIPTION_BUFFER_SIZE,
            env_value: "0".to_string(),
            message: "Must be a positive number".to_string(),
        }),
        Some(size) => Ok(size),
        None => Ok(DEFAULT_SUBSCRIPTION_BUFFER_SIZE),
    }
}

pub fn get_subscription_overflow(env: &dyn Environment) -> Result<OverflowMode, EnvError> {
    let mode = env.get(EXO_SUBSCRIPTION_OVERFLOW);

    match mode.as_deref().map(str::trim) {
        Some("buffer") | Some("") | None => Ok(OverflowMode::Buffer),
        Some("drop-oldest") => Ok(OverflowMode::DropOldest),
        Some("drop-newest") => Ok(OverflowMode::DropNewest),
        Some(other) => Err(EnvError::InvalidEnum {
            env_key: EXO_SUBSCRIPTION_OVERFLOW,
            env_value: other.to_string(),
            message: "Must be one of 'buffer', 'drop-oldest', or 'drop-newest'".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapEnvironment;

    #[test]
    fn defaults_when_unset() {
        let env = MapEnvironment::new();

        assert_eq!(get_max_query_depth(&env).unwrap(), DEFAULT_MAX_QUERY_DEPTH);
        assert_eq!(get_loader_max_batch_size(&env).unwrap(), None);
        assert_eq!(
            get_subscription_buffer_size(&env).unwrap(),
            DEFAULT_SUBSCRIPTION_BUFFER_SIZE
        );
        assert_eq!(get_subscription_overflow(&env).unwrap(), OverflowMode::Buffer);
    }

    #[test]
    fn zero_batch_size_means_unlimited() {
        let env = MapEnvironment::from([(EXO_LOADER_MAX_BATCH_SIZE, "0")]);
        assert_eq!(get_loader_max_batch_size(&env).unwrap(), None);
    }

    #[test]
    fn rejects_unknown_overflow_mode() {
        let env = MapEnvironment::from([(EXO_SUBSCRIPTION_OVERFLOW, "drop-everything")]);
        assert!(matches!(
            get_subscription_overflow(&env),
            Err(EnvError::InvalidEnum { .. })
        ));

        let env = MapEnvironment::from([(EXO_SUBSCRIPTION_BUFFER_SIZE, "0")]);
        assert!(get_subscription_buffer_size(&env).is_err());
    }
}
