// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use clap::{Arg, ArgMatches, Command};
use common::Environment;
use core_resolver::Identity;
use serde_json::{Map, Value};

#[async_trait]
pub trait CommandDefinition: Send + Sync {
    fn command(&self) -> Command;

    async fn execute(&self, matches: &ArgMatches, env: Arc<dyn Environment>) -> Result<()>;
}

pub struct SubcommandDefinition {
    pub name: &'static str,
    pub about: &'static str,
    pub command_definitions: Vec<Box<dyn CommandDefinition>>,
}

impl SubcommandDefinition {
    pub fn new(
        name: &'static str,
        about: &'static str,
        command_definitions: Vec<Box<dyn CommandDefinition>>,
    ) -> Self {
        Self {
            name,
            about,
            command_definitions,
        }
    }
}

#[async_trait]
impl CommandDefinition for SubcommandDefinition {
    fn command(&self) -> Command {
        Command::new(self.name)
            .about(self.about)
            .subcommand_required(true)
            .arg_required_else_help(true)
            .disable_help_subcommand(true)
            .subcommands(
                self.command_definitions
                    .iter()
                    .map(|command_definition| command_definition.command()),
            )
    }

    async fn execute(&self, matches: &ArgMatches, env: Arc<dyn Environment>) -> Result<()> {
        let (name, sub_matches) = matches
            .subcommand()
            .ok_or_else(|| anyhow!("No subcommand given"))?;

        for command_definition in &self.command_definitions {
            if command_definition.command().get_name() == name {
                return command_definition.execute(sub_matches, env).await;
            }
        }

        Err(anyhow!("Unknown subcommand: {}", name))
    }
}

pub fn get_required<T: Clone + Send + Sync + 'static>(
    matches: &ArgMatches,
    arg_id: &str,
) -> Result<T> {
    get(matches, arg_id).ok_or_else(|| anyhow!("Required argument `{}` is not present", arg_id))
}

pub fn get<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, arg_id: &str) -> Option<T> {
    matches.get_one::<T>(arg_id).cloned()
}

pub fn subject_arg() -> Arg {
    Arg::new("subject")
        .help("Run as this user id")
        .long_help(
            "Run the operation as an authenticated caller with this subject (a user id such as \
             `u1`). Anonymous if omitted.",
        )
        .long("as")
        .required(false)
        .num_args(1)
}

pub fn role_arg() -> Arg {
    Arg::new("role")
        .help("Grant a role to the caller")
        .long("role")
        .required(false)
        .action(clap::ArgAction::Append)
        .num_args(1)
}

/// The caller described by `--as` and `--role`.
pub fn identity(matches: &ArgMatches) -> Identity {
    let identity = match get::<String>(matches, "subject") {
        Some(subject) => Identity::authenticated(subject),
        None => Identity::anonymous(),
    };

    matches
        .get_many::<String>("role")
        .into_iter()
        .flatten()
        .fold(identity, |identity, role| identity.with_role(role))
}

pub fn variables_arg() -> Arg {
    Arg::new("variables")
        .help("Operation variables as a JSON object")
        .long("variables")
        .short('v')
        .required(false)
        .num_args(1)
}

pub fn parse_variables(variables: Option<String>) -> Result<Map<String, Value>> {
    match variables {
        None => Ok(Map::new()),
        Some(variables) => match serde_json::from_str(&variables)? {
            Value::Object(map) => Ok(map),
            other => Err(anyhow!("Variables must be a JSON object, found {other}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_variables() {
        assert!(parse_variables(None).unwrap().is_empty());

        let variables = parse_variables(Some(r#"{"id": "p2"}"#.to_string())).unwrap();
        assert_eq!(variables.get("id"), Some(&json!("p2")));

        assert!(parse_variables(Some("[1, 2]".to_string())).is_err());
        assert!(parse_variables(Some("{".to_string())).is_err());
    }

    #[test]
    fn builds_identity_from_flags() {
        let command = Command::new("test").arg(subject_arg()).arg(role_arg());

        let matches = command
            .clone()
            .get_matches_from(["test", "--as", "u1", "--role", "admin", "--role", "editor"]);
        let caller = identity(&matches);
        assert_eq!(caller.subject.as_deref(), Some("u1"));
        assert!(caller.has_role("admin"));
        assert!(caller.has_role("editor"));

        let matches = command.get_matches_from(["test"]);
        assert_eq!(identity(&matches), Identity::anonymous());
    }
}
