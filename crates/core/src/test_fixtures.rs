//! Blog model shared by unit tests: posts that cache their author's name,
//! comment count, body length, and duplicate count.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

use crate::engine::PersistCycle;
use crate::error::Error;
use crate::record::{Model, Record};
use crate::registry::{Denormalizer, Registration, RegistrationOptions, TableSchema, TriggerSpec};
use crate::store::{MemoryStore, Migration};
use crate::value::{Filter, Row, Value};

pub(crate) const BLOG_MIGRATIONS: &[Migration] =
    &[Migration::new(1, "blog tables", include_str!("../fixtures/blog.sql"))];

const POST_FIELDS: &[&str] = &[
    "id",
    "subject",
    "body",
    "user_id",
    "denormalized_user_name",
    "denormalized_user_name_computed_at",
    "denormalized_comments_count",
    "denormalized_comments_count_computed_at",
    "denormalized_body_length",
    "denormalized_body_length_computed_at",
    "denormalized_identical_post_count",
    "created_at",
    "updated_at",
];

/// Attribute values plus the snapshot taken at the last persist.
#[derive(Debug, Clone, Default)]
struct Attributes {
    current: Row,
    persisted: Row,
}

impl Attributes {
    fn loaded(row: Row) -> Self {
        Self { current: row.clone(), persisted: row }
    }

    fn get(&self, field: &str) -> Value {
        self.current.get(field).cloned().unwrap_or_default()
    }

    fn set(&mut self, field: &str, value: Value) {
        self.current.insert(field.to_string(), value);
    }

    fn changed(&self) -> BTreeSet<String> {
        self.current
            .iter()
            .filter(|(field, value)| self.persisted.get(*field).unwrap_or(&Value::Null) != *value)
            .map(|(field, _)| field.clone())
            .collect()
    }

    fn is_new(&self) -> bool {
        self.persisted.get("id").is_none_or(Value::is_null)
    }

    fn key(&self) -> Option<Value> {
        self.persisted.get("id").filter(|id| !id.is_null()).cloned()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.get("updated_at").as_timestamp()
    }

    fn commit(&mut self) {
        self.persisted = self.current.clone();
    }

    fn from_row(record_type: &str, row: Row) -> Result<Self, Error> {
        if row.get("id").is_none_or(Value::is_null) {
            return Err(Error::InvalidRow(format!("{record_type} row without id")));
        }
        Ok(Self::loaded(row))
    }
}

macro_rules! record_via_attributes {
    () => {
        fn get(&self, field: &str) -> Value {
            self.attrs.get(field)
        }

        fn set(&mut self, field: &str, value: Value) {
            self.attrs.set(field, value);
        }

        fn changed_fields(&self) -> BTreeSet<String> {
            self.attrs.changed()
        }

        fn is_new(&self) -> bool {
            self.attrs.is_new()
        }

        fn key(&self) -> Option<Value> {
            self.attrs.key()
        }

        fn updated_at(&self) -> Option<DateTime<Utc>> {
            self.attrs.updated_at()
        }
    };
}

#[derive(Debug, Clone)]
pub struct User {
    attrs: Attributes,
}

impl User {
    pub fn new(name: &str) -> Self {
        let mut attrs = Attributes::default();
        attrs.set("name", Value::from(name));
        Self { attrs }
    }
}

impl Record for User {
    record_via_attributes!();
}

impl Model for User {
    const RECORD_TYPE: &'static str = "User";

    fn from_row(row: Row) -> Result<Self, Error> {
        Ok(Self { attrs: Attributes::from_row(Self::RECORD_TYPE, row)? })
    }
}

#[derive(Debug, Clone)]
pub struct Comment {
    attrs: Attributes,
}

impl Comment {
    pub fn new(body: &str) -> Self {
        let mut attrs = Attributes::default();
        attrs.set("body", Value::from(body));
        Self { attrs }
    }
}

impl Record for Comment {
    record_via_attributes!();
}

impl Model for Comment {
    const RECORD_TYPE: &'static str = "Comment";

    fn from_row(row: Row) -> Result<Self, Error> {
        Ok(Self { attrs: Attributes::from_row(Self::RECORD_TYPE, row)? })
    }
}

#[derive(Debug, Clone)]
pub struct Post {
    attrs: Attributes,
    user: Option<User>,
    pub comments: Vec<Comment>,
}

impl Post {
    pub fn new(subject: &str, body: &str) -> Self {
        let mut attrs = Attributes::default();
        attrs.set("subject", Value::from(subject));
        attrs.set("body", Value::from(body));
        Self { attrs, user: None, comments: Vec::new() }
    }

    pub fn set_user(&mut self, user: User) {
        self.attrs.set("user_id", user.key().unwrap_or_default());
        self.user = Some(user);
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn user_mut(&mut self) -> Option<&mut User> {
        self.user.as_mut()
    }
}

impl Record for Post {
    record_via_attributes!();

    fn related(&self, association: &str) -> Option<&dyn Record> {
        match association {
            "user" => self.user.as_ref().map(|user| user as &dyn Record),
            _ => None,
        }
    }

    fn related_many(&self, association: &str) -> Vec<&dyn Record> {
        match association {
            "comments" => self.comments.iter().map(|c| c as &dyn Record).collect(),
            _ => Vec::new(),
        }
    }
}

impl Model for Post {
    const RECORD_TYPE: &'static str = "Post";

    fn from_row(row: Row) -> Result<Self, Error> {
        Ok(Self { attrs: Attributes::from_row(Self::RECORD_TYPE, row)?, user: None, comments: Vec::new() })
    }
}

pub fn post_schema() -> TableSchema {
    TableSchema::new("Post", "posts")
        .fields(POST_FIELDS.iter().copied())
        .belongs_to("user", "User")
        .has_many("comments", "Comment")
}

pub fn post_options() -> RegistrationOptions {
    RegistrationOptions::default()
        .trigger("denormalized_user_name", TriggerSpec::on(["user"]))
        .trigger("denormalized_comments_count", TriggerSpec::on(["comments"]))
        .trigger("denormalized_identical_post_count", TriggerSpec::Always)
        .invalid_when_null("denormalized_body_length")
}

pub fn blog_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_table("users", "id", ["name", "created_at", "updated_at"]);
    store.create_table("posts", "id", POST_FIELDS.iter().copied());
    store.create_table("comments", "id", ["post_id", "body", "created_at", "updated_at"]);
    store
}

/// Post registration whose duplicate count reads an empty store.
pub fn post_registration() -> Registration<Post> {
    post_registration_with(blog_store())
}

fn post_registration_with(store: MemoryStore) -> Registration<Post> {
    Registration::new(post_schema())
        .options(post_options())
        .compute("user_name", |post: &Post| Ok(post.user().map_or(Value::Null, |user| user.get("name"))))
        .compute("comments_count", |post: &Post| Ok(Value::from(post.comments.len())))
        .compute("body_length", |post: &Post| {
            Ok(post
                .get("body")
                .as_text()
                .map_or(Value::Null, |body| Value::from(body.chars().count())))
        })
        .compute("identical_post_count", move |post: &Post| {
            let same = Filter::And(vec![
                Filter::eq("subject", post.get("subject")),
                Filter::eq("body", post.get("body")),
                Filter::eq("user_id", post.get("user_id")),
            ]);
            let key = post.key();
            let count = store
                .rows("posts")
                .iter()
                .filter(|row| same.matches(row) == Some(true))
                .filter(|row| key.as_ref().is_none_or(|key| row.get("id") != Some(key)))
                .count();
            Ok(Value::from(count))
        })
}

/// Persists the blog model into a [`MemoryStore`] through the lifecycle hooks.
///
/// `updated_at` comes from a clock that advances one second per write, so
/// ordering between records never depends on wall-clock resolution.
pub struct Blog {
    pub posts: Arc<Denormalizer<Post>>,
    pub store: MemoryStore,
    epoch: DateTime<Utc>,
    ticks: AtomicI64,
    ids: AtomicI64,
}

impl Default for Blog {
    fn default() -> Self {
        Self::new()
    }
}

impl Blog {
    pub fn new() -> Self {
        let store = blog_store();
        let posts = post_registration_with(store.clone())
            .build()
            .expect("post registration");
        Self {
            posts: Arc::new(posts),
            store,
            epoch: Utc::now(),
            ticks: AtomicI64::new(0),
            ids: AtomicI64::new(0),
        }
    }

    fn tick(&self) -> Value {
        let ticks = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        Value::Timestamp(self.epoch + Duration::seconds(ticks))
    }

    fn next_id(&self) -> Value {
        Value::Integer(self.ids.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// An unsaved post by a saved user, Ogden Nash.
    pub fn new_poetry(&self) -> Post {
        let mut post = Post::new("Further Reflections on Parsley", "Parsley\nIs gharsley.");
        post.set_user(self.create_user("Ogden Nash"));
        post
    }

    pub fn create_user(&self, name: &str) -> User {
        let mut user = User::new(name);
        self.write_user(&mut user);
        user
    }

    pub fn save_user(&mut self, user: &mut User) {
        self.write_user(user);
    }

    fn write_user(&self, user: &mut User) {
        let now = self.tick();
        if user.is_new() {
            user.set("id", self.next_id());
            user.set("created_at", now.clone());
        }
        user.set("updated_at", now);
        user.attrs.commit();
        self.store
            .upsert("users", user.attrs.current.clone())
            .expect("users table");
    }

    pub fn save_post(&mut self, post: &mut Post) -> Result<(), Error> {
        let posts = Arc::clone(&self.posts);
        let mut cycle = PersistCycle::new();
        posts.persist_with(post, &mut cycle, |post| self.write_post(post))
    }

    /// Writes the post and its new or changed comments with one timestamp.
    fn write_post(&self, post: &mut Post) -> Result<(), Error> {
        let now = self.tick();
        if post.is_new() {
            post.set("id", self.next_id());
            post.set("created_at", now.clone());
        }
        post.set("updated_at", now.clone());
        post.attrs.commit();
        self.store.upsert("posts", post.attrs.current.clone())?;

        let post_id = post.get("id");
        for comment in &mut post.comments {
            if !comment.is_new() && !comment.has_changes() {
                continue;
            }
            if comment.is_new() {
                comment.set("id", self.next_id());
                comment.set("created_at", now.clone());
            }
            comment.set("post_id", post_id.clone());
            comment.set("updated_at", now.clone());
            comment.attrs.commit();
            self.store.upsert("comments", comment.attrs.current.clone())?;
        }
        Ok(())
    }

    /// Load a post row with its user and comments.
    pub fn hydrate_post(&self, row: Row) -> Result<Post, Error> {
        let mut post = Post::from_row(row)?;
        if let Some(user_row) = self.store.find("users", &post.get("user_id")) {
            post.user = Some(User::from_row(user_row)?);
        }
        if let Some(key) = post.key() {
            let belongs = Filter::Eq("post_id".into(), key);
            post.comments = self
                .store
                .rows("comments")
                .into_iter()
                .filter(|row| belongs.matches(row) == Some(true))
                .map(Comment::from_row)
                .collect::<Result<_, _>>()?;
        }
        Ok(post)
    }

    pub fn reload_post(&self, post: &Post) -> Post {
        let key = post.key().expect("persisted post");
        let row = self.store.find("posts", &key).expect("post row");
        self.hydrate_post(row).expect("post hydrates")
    }

    /// Null a column of the post's row without going through the hooks.
    pub fn null_column(&self, post: &Post, field: &str) {
        let key = post.key().expect("persisted post");
        let mut row = self.store.find("posts", &key).expect("post row");
        row.insert(field.to_string(), Value::Null);
        self.store.upsert("posts", row).expect("posts table");
    }
}
