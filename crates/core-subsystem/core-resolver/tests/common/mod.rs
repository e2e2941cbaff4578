// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

#![allow(dead_code)]

//! An in-memory blog: schema, resolvers and loaders that record every batch they receive.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use core_model::{
    AccessExpression, ArgumentDefinition, FieldDefinition, FieldType, Schema, SchemaBuilder,
};
use core_resolver::{
    BatchLoader, DispatchTableBuilder, Engine, EngineConfig, FieldError, FieldValue, Identity,
    ResolveParams, Response, SubscriptionResolver, SubscriptionSpec, resolver_fn,
};
use event_broker::{DeliveryPolicy, EventBroker, InProcessBroker};
use serde_json::{Map, Value, json};

pub struct Blog {
    users: BTreeMap<String, Value>,
    posts: Mutex<Vec<Value>>,
    pub user_batches: Mutex<Vec<Vec<String>>>,
    pub post_batches: Mutex<Vec<Vec<String>>>,
    pub secret_reads: AtomicUsize,
    pub author_reads: AtomicUsize,
    pub fail_users: AtomicBool,
}

impl Blog {
    /// `user_count` users (`u0`, `u1`, ...) each mentored by the next, and `post_count` posts
    /// (`p1`, `p2`, ...) written by the users in turn.
    pub fn new(user_count: usize, post_count: usize) -> Arc<Self> {
        let users = (0..user_count)
            .map(|i| {
                let id = format!("u{i}");
                let user = json!({
                    "id": id,
                    "name": format!("User {i}"),
                    "mentorId": format!("u{}", (i + 1) % user_count),
                });
                (id, user)
            })
            .collect();

        let posts = (1..=post_count)
            .map(|i| {
                json!({
                    "id": format!("p{i}"),
                    "title": format!("Post {i}"),
                    "authorId": format!("u{}", (i - 1) % user_count.max(1)),
                })
            })
            .collect();

        Arc::new(Self {
            users,
            posts: Mutex::new(posts),
            user_batches: Mutex::new(vec![]),
            post_batches: Mutex::new(vec![]),
            secret_reads: AtomicUsize::new(0),
            author_reads: AtomicUsize::new(0),
            fail_users: AtomicBool::new(false),
        })
    }

    pub fn add_post(&self, post: Value) {
        self.posts.lock().unwrap().push(post);
    }

    pub fn posts(&self) -> Vec<Value> {
        self.posts.lock().unwrap().clone()
    }

    pub fn user_batches(&self) -> Vec<Vec<String>> {
        self.user_batches.lock().unwrap().clone()
    }

    pub fn post_batches(&self) -> Vec<Vec<String>> {
        self.post_batches.lock().unwrap().clone()
    }
}

pub struct UserLoader(pub Arc<Blog>);

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
        self.0.user_batches.lock().unwrap().push(keys.to_vec());

        if self.0.fail_users.load(Ordering::SeqCst) {
            return Err(FieldError::resolver("User store unavailable"));
        }

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

pub struct PostsByAuthorLoader(pub Arc<Blog>);

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
        self.0.post_batches.lock().unwrap().push(keys.to_vec());

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

pub struct ChatSubscription {
    pub capacity: usize,
}

#[async_trait]
impl SubscriptionResolver for ChatSubscription {
    async fn subscribe(&self, params: ResolveParams) -> Result<SubscriptionSpec, FieldError> {
        let chat_id: String = params.required_argument("chatId")?;
        if chat_id.is_empty() {
            return Err(FieldError::resolver("chatId must not be empty"));
        }

        let topic = format!("chat:{chat_id}");
        Ok(SubscriptionSpec::new(topic).with_filter(move |event| event["chatId"] == *chat_id))
    }

    fn delivery_policy(&self) -> Option<DeliveryPolicy> {
        Some(DeliveryPolicy::Buffer {
            capacity: self.capacity,
        })
    }
}

pub struct TickerSubscription;

#[async_trait]
impl SubscriptionResolver for TickerSubscription {
    async fn subscribe(&self, _params: ResolveParams) -> Result<SubscriptionSpec, FieldError> {
        Ok(SubscriptionSpec::new("ticker"))
    }

    fn resolve_event(&self, event: Value) -> Result<Value, FieldError> {
        event
            .get("price")
            .cloned()
            .ok_or_else(|| FieldError::resolver("Tick without a price"))
    }

    fn delivery_policy(&self) -> Option<DeliveryPolicy> {
        Some(DeliveryPolicy::DropOldest { capacity: 2 })
    }
}

pub fn blog_schema() -> Schema {
    SchemaBuilder::new()
        .object(
            "Query",
            [
                FieldDefinition::new(
                    "posts",
                    FieldType::named("Post").non_null().list().non_null(),
                )
                .argument(
                    ArgumentDefinition::new("limit", FieldType::named("Int"))
                        .default_value(json!(100)),
                ),
                FieldDefinition::new("post", FieldType::named("Post"))
                    .argument(ArgumentDefinition::new("id", FieldType::named("ID").non_null())),
                FieldDefinition::new("user", FieldType::named("User"))
                    .argument(ArgumentDefinition::new("id", FieldType::named("ID").non_null())),
                FieldDefinition::new("me", FieldType::named("User"))
                    .access(AccessExpression::Authenticated),
                FieldDefinition::new("secret", FieldType::named("String"))
                    .access(AccessExpression::role("admin")),
                FieldDefinition::new("numbers", FieldType::named("Int").list()),
                FieldDefinition::new("strictNumbers", FieldType::named("Int").non_null().list()),
                FieldDefinition::new("count", FieldType::named("Int")),
                FieldDefinition::new("explode", FieldType::named("String")),
                FieldDefinition::new("slow", FieldType::named("Post")),
                FieldDefinition::new("draft", FieldType::named("Post")),
            ],
        )
        .object(
            "Post",
            [
                FieldDefinition::new("id", FieldType::named("ID").non_null()),
                FieldDefinition::new("title", FieldType::named("String").non_null()),
                FieldDefinition::new("author", FieldType::named("User").non_null()),
                FieldDefinition::new("authorMentor", FieldType::named("User")),
            ],
        )
        .object(
            "User",
            [
                FieldDefinition::new("id", FieldType::named("ID").non_null()),
                FieldDefinition::new("name", FieldType::named("String")),
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
            [FieldDefinition::new("createPost", FieldType::named("Post").non_null())
                .argument(ArgumentDefinition::new(
                    "title",
                    FieldType::named("String").non_null(),
                ))
                .argument(
                    ArgumentDefinition::new("authorId", FieldType::named("ID").non_null())
                        .default_value(json!("u0")),
                )],
        )
        .object(
            "Subscription",
            [
                FieldDefinition::new("messageAdded", FieldType::named("Message").non_null())
                    .argument(ArgumentDefinition::new(
                        "chatId",
                        FieldType::named("ID").non_null(),
                    )),
                FieldDefinition::new("ticker", FieldType::named("Int")),
            ],
        )
        .build()
        .unwrap()
}

pub fn blog_dispatch(blog: &Arc<Blog>, chat_capacity: usize) -> DispatchTableBuilder {
    let mut dispatch = DispatchTableBuilder::new();

    let posts_blog = blog.clone();
    let post_blog = blog.clone();
    let secret_blog = blog.clone();
    let author_blog = blog.clone();
    let create_blog = blog.clone();

    dispatch
        .register(
            "Query",
            "posts",
            resolver_fn(move |params| all_posts(posts_blog.clone(), params)),
        )
        .unwrap()
        .register(
            "Query",
            "post",
            resolver_fn(move |params| post_by_id(post_blog.clone(), params)),
        )
        .unwrap()
        .register("Query", "user", resolver_fn(user_by_id))
        .unwrap()
        .register("Query", "me", resolver_fn(me))
        .unwrap()
        .register(
            "Query",
            "secret",
            resolver_fn(move |_| read_secret(secret_blog.clone())),
        )
        .unwrap()
        .register("Query", "numbers", resolver_fn(unlucky_numbers))
        .unwrap()
        .register("Query", "strictNumbers", resolver_fn(unlucky_numbers))
        .unwrap()
        .register("Query", "count", resolver_fn(count))
        .unwrap()
        .register("Query", "explode", resolver_fn(explode))
        .unwrap()
        .register("Query", "slow", resolver_fn(slow_post))
        .unwrap()
        .register("Query", "draft", resolver_fn(draft_id))
        .unwrap()
        .register_properties("Post", &["id", "title"])
        .unwrap()
        .register(
            "Post",
            "author",
            resolver_fn(move |params| post_author(author_blog.clone(), params)),
        )
        .unwrap()
        .register("Post", "authorMentor", resolver_fn(post_author_mentor))
        .unwrap()
        .register_properties("User", &["id", "name"])
        .unwrap()
        .register("User", "posts", resolver_fn(user_posts))
        .unwrap()
        .register_properties("Message", &["chatId", "text"])
        .unwrap()
        .register("Message", "sender", resolver_fn(message_sender))
        .unwrap()
        .register(
            "Mutation",
            "createPost",
            resolver_fn(move |params| create_post(create_blog.clone(), params)),
        )
        .unwrap()
        .register_subscription(
            "Subscription",
            "messageAdded",
            Arc::new(ChatSubscription {
                capacity: chat_capacity,
            }),
        )
        .unwrap()
        .register_subscription("Subscription", "ticker", Arc::new(TickerSubscription))
        .unwrap();

    dispatch
}

async fn all_posts(blog: Arc<Blog>, params: ResolveParams) -> Result<FieldValue, FieldError> {
    let limit: usize = params.required_argument("limit")?;
    let posts = blog.posts().into_iter().take(limit).collect();
    Ok(FieldValue::Value(Value::Array(posts)))
}

async fn post_by_id(blog: Arc<Blog>, params: ResolveParams) -> Result<FieldValue, FieldError> {
    let id: String = params.required_argument("id")?;
    let post = blog.posts().into_iter().find(|post| post["id"] == *id);
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

async fn read_secret(blog: Arc<Blog>) -> Result<FieldValue, FieldError> {
    blog.secret_reads.fetch_add(1, Ordering::SeqCst);
    Ok(FieldValue::Value(json!("42")))
}

async fn unlucky_numbers(_params: ResolveParams) -> Result<FieldValue, FieldError> {
    Ok(FieldValue::List(vec![
        FieldValue::Value(json!(1)),
        FieldValue::Error(FieldError::resolver("Two is unlucky")),
        FieldValue::Value(json!(3)),
    ]))
}

async fn count(_params: ResolveParams) -> Result<FieldValue, FieldError> {
    Ok(FieldValue::Value(json!("many")))
}

async fn explode(_params: ResolveParams) -> Result<FieldValue, FieldError> {
    Err(FieldError::internal("connection refused: 10.0.0.7:5432"))
}

/// Returns the post's id where the post itself is expected
async fn draft_id(_params: ResolveParams) -> Result<FieldValue, FieldError> {
    Ok(FieldValue::Value(json!("p1")))
}

async fn slow_post(_params: ResolveParams) -> Result<FieldValue, FieldError> {
    tokio::time::sleep(Duration::from_secs(10)).await;
    Ok(FieldValue::Value(
        json!({"id": "p1", "title": "Post 1", "authorId": "u0"}),
    ))
}

async fn post_author(blog: Arc<Blog>, params: ResolveParams) -> Result<FieldValue, FieldError> {
    blog.author_reads.fetch_add(1, Ordering::SeqCst);
    let author_id: String = serde_json::from_value(params.parent["authorId"].clone())?;
    Ok(params.context.loader::<UserLoader>().load(author_id))
}

/// Two dependent loads: the author first, then the author's mentor.
async fn post_author_mentor(params: ResolveParams) -> Result<FieldValue, FieldError> {
    let author_id: String = serde_json::from_value(params.parent["authorId"].clone())?;
    let context = params.context.clone();

    Ok(params
        .context
        .loader::<UserLoader>()
        .load(author_id)
        .and_then(move |author| match author["mentorId"].as_str() {
            Some(mentor_id) => context.loader::<UserLoader>().load(mentor_id.to_string()),
            None => FieldValue::null(),
        }))
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

async fn create_post(blog: Arc<Blog>, params: ResolveParams) -> Result<FieldValue, FieldError> {
    let title: String = params.required_argument("title")?;
    let author_id: String = params.required_argument("authorId")?;

    // The first post is slow to create, so a concurrent second mutation would overtake it
    if title == "A" {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let post = {
        let mut posts = blog.posts.lock().unwrap();
        let post = json!({
            "id": format!("p{}", posts.len() + 1),
            "title": title,
            "authorId": author_id,
        });
        posts.push(post.clone());
        post
    };

    params.context.publish("posts", post.clone());
    Ok(FieldValue::Value(post))
}

pub fn blog_engine(blog: &Arc<Blog>) -> Engine {
    blog_engine_with(
        blog,
        EngineConfig::default(),
        Arc::new(InProcessBroker::new()),
        16,
    )
}

pub fn blog_engine_with(
    blog: &Arc<Blog>,
    config: EngineConfig,
    broker: Arc<dyn EventBroker>,
    chat_capacity: usize,
) -> Engine {
    Engine::builder(blog_schema())
        .dispatch(blog_dispatch(blog, chat_capacity))
        .loader(UserLoader(blog.clone()))
        .loader(PostsByAuthorLoader(blog.clone()))
        .broker(broker)
        .config(config)
        .build()
        .unwrap()
}

/// Validate and execute `query` as `identity`.
pub async fn run(engine: &Engine, query: &str, identity: Identity) -> Response {
    let context = engine.context(identity);
    engine.execute_query(query, None, Map::new(), &context).await
}

pub fn as_json(response: &Response) -> Value {
    serde_json::to_value(response).unwrap()
}
