// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Arg, ArgMatches, Command};
use colored::Colorize;
use common::Environment;
use core_resolver::EngineConfig;

use crate::{
    blog,
    commands::command::{
        CommandDefinition, get, get_required, identity, parse_variables, role_arg, subject_arg,
        variables_arg,
    },
};

pub(crate) struct QueryCommandDefinition {}

#[async_trait]
impl CommandDefinition for QueryCommandDefinition {
    fn command(&self) -> Command {
        Command::new("query")
            .about("Run a query or mutation against the bundled blog")
            .arg(
                Arg::new("query")
                    .help("The GraphQL document to execute")
                    .required(true)
                    .index(1),
            )
            .arg(variables_arg())
            .arg(
                Arg::new("operation-name")
                    .help("The operation to run, if the document has several")
                    .long("operation-name")
                    .required(false)
                    .num_args(1),
            )
            .arg(subject_arg())
            .arg(role_arg())
    }

    /// Execute the operation and print its envelope, followed by loader statistics
    async fn execute(&self, matches: &ArgMatches, env: Arc<dyn Environment>) -> Result<()> {
        let query: String = get_required(matches, "query")?;
        let variables = parse_variables(get(matches, "variables"))?;
        let operation_name: Option<String> = get(matches, "operation-name");

        let engine = blog::engine(EngineConfig::from_env(env.as_ref())?)?;
        let context = engine.context(identity(matches));

        let response = engine
            .execute_query(&query, operation_name, variables, &context)
            .await;

        println!("{}", serde_json::to_string_pretty(&response)?);

        for (loader, stats) in context.loader_stats() {
            eprintln!(
                "{} {}: {} batch call(s), {} key(s)",
                "loader".dimmed(),
                loader.bold(),
                stats.batch_calls,
                stats.keys_loaded
            );
        }

        if !response.is_ok() {
            eprintln!(
                "{}",
                format!("Completed with {} error(s)", response.errors.len()).yellow()
            );
        }

        Ok(())
    }
}
