// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The in-memory blog the CLI runs operations against.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use anyhow::Result;
use async_trait::async_trait;
use core_model::{
    AccessExpression, ArgumentDefinition, FieldDefinition, FieldType, Schema, SchemaBuilder,
    SchemaError,
};
use core_resolver::{
    BatchLoader, DispatchError, DispatchTableBuilder, Engine, EngineConfig, FieldError,
    FieldValue, ResolveParams, SubscriptionResolver, SubscriptionSpec, resolver_fn,
};
use serde_json::{Value, json};

pub(crate) struct BlogStore {
    users: BTreeMap<String, Value>,
    posts: Mutex<Vec<Value>>,
}

impl BlogStore {
    pub(crate) fn seeded() -> Arc<Self> {
        let users = [("u1", "Alice"), ("u2", "Bob"), ("u3", "Carol")]
            .into_iter()
            .map(|(id, name)| {
                let email = format!("{}@example.com", name.to_lowercase());
                (
                    id.to_string(),
                    json!({"id": id, "name": name, "email": email}),
                )
            })
            .collect();

        let posts = [
            ("p1", "Batching in practice", "u1"),
            ("p2", "Waves and levels", "u2"),
            ("p3", "Why nulls bubble", "u1"),
            ("p4", "Subscriptions without tears", "u3"),
            ("p5", "Serial mutations", "u2"),
        ]
        .into_iter()
        .map(|(id, title, author_id)| json!({"id": id, "title": title, "authorId": author_id}))
        .collect();

        Arc::new(Self {
            users,
            posts: Mutex::new(posts),
        })
    }

    fn posts(&self) -> MutexGuard<'_, Vec<Value>> {
        self.posts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct UserLoader(Arc<BlogStore>);

#[async_trait]
impl BatchLoader for UserLoader {
    type Key = String;

    fn name(&self) -> &'static str {
        "users"
    }

    async fn load(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Result<Value, FieldError>>, FieldError> {
        Ok(keys
            .iter()
            .filter_map(|key| {
                self.0
                    .users
                    .get(key)
                    .map(|user| (key.clone(), Ok(user.clone())))
            })
            .collect())
    }
}

struct PostsByAuthorLoader(Arc<BlogStore>);

#[async_trait]
impl BatchLoader for PostsByAuthorLoader {
    type Key = String;

    fn name(&self) -> &'static str {
        "posts_by_author"
    }

    async fn load(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Result<Value, FieldError>>, FieldError> {
        let posts = self.0.posts();

        Ok(keys
            .iter()
            .map(|key| {
                let written = posts
                    .iter()
                    .filter(|post| post["authorId"] == *key)
                    .cloned()
                    .collect();
                (key.clone(), Ok(Value::Array(written)))
            })
            .collect())
    }
}

pub(crate) fn chat_topic(chat_id: &str) -> String {
    format!("chat:{chat_id}")
}

struct MessageAdded;

#[async_trait]
impl SubscriptionResolver for MessageAdded {
    async fn subscribe(&self, params: ResolveParams) -> Result<SubscriptionSpec, FieldError> {
        let chat_id: String = params.required_argument("chatId")?;
        Ok(SubscriptionSpec::new(chat_topic(&chat_id)))
    }
}

pub(crate) fn schema() -> Result<Schema, SchemaError> {
    SchemaBuilder::new()
        .object(
            "Query",
            [
                FieldDefinition::new(
                    "posts",
                    FieldType::named("Post").non_null().list().non_null(),
                )
                .argument(ArgumentDefinition::new("limit", FieldType::named("Int"))),
                FieldDefinition::new("post", FieldType::named("Post"))
                    .argument(ArgumentDefinition::new("id", FieldType::named("ID").non_null())),
                FieldDefinition::new("user", FieldType::named("User"))
                    .argument(ArgumentDefinition::new("id", FieldType::named("ID").non_null())),
                FieldDefinition::new("me", FieldType::named("User"))
                    .access(AccessExpression::Authenticated),
            ],
        )
        .object(
            "Post",
            [
                FieldDefinition::new("id", FieldType::named("ID").non_null()),
                FieldDefinition::new("title", FieldType::named("String").non_null()),
                FieldDefinition::new("author", FieldType::named("User").non_null()),
            ],
        )
        .object(
            "User",
            [
                FieldDefinition::new("id", FieldType::named("ID").non_null()),
                FieldDefinition::new("name", FieldType::named("String").non_null()),
                FieldDefinition::new("email", FieldType::named("String"))
                    .access(AccessExpression::role("admin")),
                FieldDefinition::new(
                    "posts",
                    FieldType::named("Post").non_null().list().non_null(),
                ),
            ],
        )
        .object(
            "Message",
            [
                FieldDefinition::new("chatId", FieldType::named("ID").non_null()),
                FieldDefinition::new("text", FieldType::named("String").non_null()),
                FieldDefinition::new("sender", FieldType::named("User")),
            ],
        )
        .object(
            "Mutation",
            [
                FieldDefinition::new("createPost", FieldType::named("Post").non_null())
                    .argument(ArgumentDefinition::new(
                        "title",
                        FieldType::named("String").non_null(),
                    ))
                    .argument(
                        ArgumentDefinition::new("authorId", FieldType::named("ID").non_null())
                            .default_value(json!("u1")),
                    ),
                FieldDefinition::new("sendMessage", FieldType::named("Message").non_null())
                    .argument(ArgumentDefinition::new(
                        "chatId",
                        FieldType::named("ID").non_null(),
                    ))
                    .argument(ArgumentDefinition::new(
                        "text",
                        FieldType::named("String").non_null(),
                    ))
                    .argument(ArgumentDefinition::new("senderId", FieldType::named("ID"))),
            ],
        )
        .object(
            "Subscription",
            [
                FieldDefinition::new("messageAdded", FieldType::named("Message").non_null())
                    .argument(ArgumentDefinition::new(
                        "chatId",
                        FieldType::named("ID").non_null(),
                    )),
            ],
        )
        .build()
}

fn dispatch(store: &Arc<BlogStore>) -> Result<DispatchTableBuilder, DispatchError> {
    let mut dispatch = DispatchTableBuilder::new();

    let posts_store = store.clone();
    let post_store = store.clone();
    let create_store = store.clone();

    dispatch
        .register(
            "Query",
            "posts",
            resolver_fn(move |params| all_posts(posts_store.clone(), params)),
        )?
        .register(
            "Query",
            "post",
            resolver_fn(move |params| post_by_id(post_store.clone(), params)),
        )?
        .register("Query", "user", resolver_fn(user_by_id))?
        .register("Query", "me", resolver_fn(me))?
        .register_properties("Post", &["id", "title"])?
        .register("Post", "author", resolver_fn(post_author))?
        .register_properties("User", &["id", "name", "email"])?
        .register("User", "posts", resolver_fn(user_posts))?
        .register_properties("Message", &["chatId", "text"])?
        .register("Message", "sender", resolver_fn(message_sender))?
        .register(
            "Mutation",
            "createPost",
            resolver_fn(move |params| create_post(create_store.clone(), params)),
        )?
        .register("Mutation", "sendMessage", resolver_fn(send_message))?
        .register_subscription("Subscription", "messageAdded", Arc::new(MessageAdded))?;

    Ok(dispatch)
}

async fn all_posts(store: Arc<BlogStore>, params: ResolveParams) -> Result<FieldValue, FieldError> {
    let limit: Option<usize> = params.optional_argument("limit")?;
    let posts = store
        .posts()
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();
    Ok(FieldValue::Value(Value::Array(posts)))
}

async fn post_by_id(
    store: Arc<BlogStore>,
    params: ResolveParams,
) -> Result<FieldValue, FieldError> {
    let id: String = params.required_argument("id")?;
    let post = store.posts().iter().find(|post| post["id"] == *id).cloned();
    Ok(FieldValue::Value(post.unwrap_or(Value::Null)))
}

async fn user_by_id(params: ResolveParams) -> Result<FieldValue, FieldError> {
    let id: String = params.required_argument("id")?;
    Ok(params.context.loader::<UserLoader>().load(id))
}

async fn me(params: ResolveParams) -> Result<FieldValue, FieldError> {
    match params.context.identity().subject.clone() {
        Some(subject) => Ok(params.context.loader::<UserLoader>().load(subject)),
        None => Ok(FieldValue::null()),
    }
}

async fn post_author(params: ResolveParams) -> Result<FieldValue, FieldError> {
    let author_id: String = serde_json::from_value(params.parent["authorId"].clone())?;
    Ok(params.context.loader::<UserLoader>().load(author_id))
}

async fn user_posts(params: ResolveParams) -> Result<FieldValue, FieldError> {
    let user_id: String = serde_json::from_value(params.parent["id"].clone())?;
    Ok(params.context.loader::<PostsByAuthorLoader>().load(user_id))
}

async fn message_sender(params: ResolveParams) -> Result<FieldValue, FieldError> {
    match params.parent["senderId"].as_str() {
        Some(sender_id) => Ok(params
            .context
            .loader::<UserLoader>()
            .load(sender_id.to_string())),
        None => Ok(FieldValue::null()),
    }
}

async fn create_post(
    store: Arc<BlogStore>,
    params: ResolveParams,
) -> Result<FieldValue, FieldError> {
    let title: String = params.required_argument("title")?;
    let author_id: String = params.required_argument("authorId")?;

    let post = {
        let mut posts = store.posts();
        let post = json!({
            "id": format!("p{}", posts.len() + 1),
            "title": title,
            "authorId": author_id,
        });
        posts.push(post.clone());
        post
    };

    Ok(FieldValue::Value(post))
}

async fn send_message(params: ResolveParams) -> Result<FieldValue, FieldError> {
    let chat_id: String = params.required_argument("chatId")?;
    let text: String = params.required_argument("text")?;
    let sender_id: Option<String> = params.optional_argument("senderId")?;

    let message = json!({"chatId": chat_id, "text": text, "senderId": sender_id});
    params.context.publish(&chat_topic(&chat_id), message.clone());

    Ok(FieldValue::Value(message))
}

/// An engine over a freshly seeded blog.
pub(crate) fn engine(config: EngineConfig) -> Result<Engine> {
    let store = BlogStore::seeded();

    let engine = Engine::builder(schema()?)
        .dispatch(dispatch(&store)?)
        .loader(UserLoader(store.clone()))
        .loader(PostsByAuthorLoader(store))
        .config(config)
        .build()?;

    Ok(engine)
}

#[cfg(test)]
mod tests {
    use core_resolver::Identity;
    use serde_json::Map;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn runs_queries_against_the_seeded_blog() {
        let engine = engine(EngineConfig::default()).unwrap();
        let context = engine.context(Identity::anonymous());

        let response = engine
            .execute_query(
                "{ posts(limit: 2) { title author { name } } }",
                None,
                Map::new(),
                &context,
            )
            .await;

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "data": {
                    "posts": [
                        {"title": "Batching in practice", "author": {"name": "Alice"}},
                        {"title": "Waves and levels", "author": {"name": "Bob"}},
                    ]
                }
            })
        );
        assert_eq!(context.loader_stats()["users"].batch_calls, 1);
    }

    #[test_log::test(tokio::test)]
    async fn emails_need_the_admin_role() {
        let engine = engine(EngineConfig::default()).unwrap();
        let query = r#"{ user(id: "u2") { email } }"#;

        let context = engine.context(Identity::authenticated("u1"));
        let response = engine.execute_query(query, None, Map::new(), &context).await;
        assert_eq!(response.data, Some(json!({"user": {"email": null}})));
        assert_eq!(response.errors[0].message, "Not authorized");

        let context = engine.context(Identity::authenticated("u1").with_role("admin"));
        let response = engine.execute_query(query, None, Map::new(), &context).await;
        assert_eq!(
            response.data,
            Some(json!({"user": {"email": "bob@example.com"}}))
        );
    }
}
