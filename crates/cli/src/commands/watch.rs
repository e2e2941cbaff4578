// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use clap::{Arg, ArgMatches, Command};
use colored::Colorize;
use common::Environment;
use core_resolver::{EngineConfig, Identity};
use futures::StreamExt;
use serde_json::{Map, json};
use tracing::warn;

use crate::{
    blog,
    commands::command::{CommandDefinition, get, get_required},
};

const SENDERS: [&str; 3] = ["u1", "u2", "u3"];

const WATCH_SUBSCRIPTION: &str = r#"
subscription Watch($chatId: ID!) {
  messageAdded(chatId: $chatId) { chatId text sender { name } }
}"#;

const SEND_MUTATION: &str = r#"
mutation Send($chatId: ID!, $text: String!, $senderId: ID) {
  sendMessage(chatId: $chatId, text: $text, senderId: $senderId) { text }
}"#;

pub(crate) struct WatchCommandDefinition {}

#[async_trait]
impl CommandDefinition for WatchCommandDefinition {
    fn command(&self) -> Command {
        Command::new("watch")
            .about("Subscribe to a chat while demo messages are sent to several chats")
            .arg(
                Arg::new("chat-id")
                    .help("The chat to watch")
                    .required(true)
                    .index(1),
            )
            .arg(
                Arg::new("events")
                    .help("Number of events to wait for")
                    .long("events")
                    .short('n')
                    .required(false)
                    .value_parser(clap::value_parser!(usize))
                    .default_value("3")
                    .num_args(1),
            )
    }

    async fn execute(&self, matches: &ArgMatches, env: Arc<dyn Environment>) -> Result<()> {
        let chat_id: String = get_required(matches, "chat-id")?;
        let events: usize = get(matches, "events").unwrap_or(3);

        let engine = blog::engine(EngineConfig::from_env(env.as_ref())?)?;

        let mut variables = Map::new();
        variables.insert("chatId".to_string(), json!(chat_id));

        let operation = engine.validate(WATCH_SUBSCRIPTION, None, Some(variables.clone()))?;
        let mut stream = engine
            .subscribe(&operation, &variables, engine.context(Identity::anonymous()))
            .await?;

        eprintln!(
            "{} {} (waiting for {events} event(s))",
            "Watching chat".green(),
            chat_id.bold()
        );

        // Messages go to the watched chat and to a decoy chat, which the subscription never sees
        let publisher = {
            let engine = engine.clone();
            let chat_id = chat_id.clone();
            tokio::spawn(async move {
                let decoy = format!("{chat_id}-other");

                for round in 0..events {
                    for chat in [&decoy, &chat_id] {
                        let mut variables = Map::new();
                        variables.insert("chatId".to_string(), json!(chat));
                        variables.insert("text".to_string(), json!(format!("message {round}")));
                        variables.insert(
                            "senderId".to_string(),
                            json!(SENDERS[round % SENDERS.len()]),
                        );

                        let context = engine.context(Identity::anonymous());
                        let response = engine
                            .execute_query(
                                SEND_MUTATION,
                                None,
                                variables,
                                &context,
                            )
                            .await;
                        if !response.is_ok() {
                            warn!(errors = ?response.errors, "Demo message was not sent");
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            })
        };

        let mut received = 0;
        while received < events {
            let response = stream
                .next()
                .await
                .ok_or_else(|| anyhow!("Subscription ended after {received} event(s)"))?;
            println!("{}", serde_json::to_string(&response)?);
            received += 1;
        }

        publisher.await?;
        Ok(())
    }
}
