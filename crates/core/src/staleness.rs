//! Staleness evaluation.
//!
//! A cached value is stale when a trigger fired since the last persist:
//! one of the record's own trigger attributes changed, or a record reached
//! through a named trigger association changed or was modified after the
//! owner. Association checks are shallow and only run for fields that name
//! associations in their triggers. Fields with the default trigger set
//! track the record's own changes only; callers unset those values when an
//! association changes out of band.

use chrono::{DateTime, Utc};

use crate::record::Record;
use crate::registry::{Denormalizer, RecordTypeConfig, Triggers};

impl RecordTypeConfig {
    /// True when the field's cached value must be recomputed.
    pub fn is_stale(&self, record: &dyn Record, attribute_name: &str) -> bool {
        let Some(field) = self.field(attribute_name) else {
            return false;
        };
        if field.invalid_when_null && record.get(attribute_name).is_null() {
            return true;
        }
        self.is_stale_by_own_change(record, attribute_name) || self.is_stale_by_association_change(record, attribute_name)
    }

    pub fn is_stale_by_own_change(&self, record: &dyn Record, attribute_name: &str) -> bool {
        match self.triggers(attribute_name) {
            None => false,
            Some(Triggers::Always) => true,
            Some(Triggers::AnyChange) => record.has_changes(),
            Some(Triggers::Names(names)) => {
                let changed = record.changed_fields();
                names.iter().any(|name| changed.contains(name))
            }
        }
    }

    pub fn is_stale_by_association_change(&self, record: &dyn Record, attribute_name: &str) -> bool {
        let triggers = match self.triggers(attribute_name) {
            None | Some(Triggers::AnyChange) => return false,
            Some(Triggers::Always) => return true,
            Some(triggers) => triggers,
        };

        let owner_updated_at = record.updated_at();
        for name in triggers.names() {
            if self.schema().find_belongs_to(name).is_some() {
                if let Some(related) = record.related(name) {
                    if related.has_changes() || modified_after(related.updated_at(), owner_updated_at) {
                        return true;
                    }
                }
            } else if self.schema().find_has_many(name).is_some() {
                let stale_member = record.related_many(name).into_iter().any(|member| {
                    member.is_new() || member.has_changes() || modified_after(member.updated_at(), owner_updated_at)
                });
                if stale_member {
                    return true;
                }
            }
        }
        false
    }

    /// True when the field was never computed, or was unset since.
    ///
    /// Always false for fields without a timestamp: "never computed" and
    /// "computed to null" cannot be told apart there.
    pub fn is_unset(&self, record: &dyn Record, attribute_name: &str) -> bool {
        self.corresponding_timestamp(attribute_name)
            .is_some_and(|stamp| record.get(stamp).is_null())
    }

    /// True when the cached value can stand in for a computation.
    ///
    /// Association staleness is not checked here.
    pub fn is_usable(&self, record: &dyn Record, attribute_name: &str) -> bool {
        !self.is_unset(record, attribute_name)
            && !self.is_stale_by_own_change(record, attribute_name)
            && (!self.invalid_when_null(attribute_name) || record.get(attribute_name).is_present())
    }

    /// Denormalized fields whose cached value is stale.
    pub fn stale_fields(&self, record: &dyn Record) -> Vec<String> {
        self.field_names()
            .filter(|name| self.is_stale(record, name))
            .map(str::to_string)
            .collect()
    }

    /// Denormalized fields whose cached value is unset.
    pub fn unset_fields(&self, record: &dyn Record) -> Vec<String> {
        self.field_names()
            .filter(|name| self.is_unset(record, name))
            .map(str::to_string)
            .collect()
    }

    pub fn any_unset(&self, record: &dyn Record) -> bool {
        self.field_names().any(|name| self.is_unset(record, name))
    }
}

/// Missing timestamps on either side count as modified.
fn modified_after(related: Option<DateTime<Utc>>, owner: Option<DateTime<Utc>>) -> bool {
    match (related, owner) {
        (Some(related), Some(owner)) => related > owner,
        _ => true,
    }
}

impl<R: Record> Denormalizer<R> {
    pub fn is_stale(&self, record: &R, attribute_name: &str) -> bool {
        self.config().is_stale(record, attribute_name)
    }

    pub fn is_unset(&self, record: &R, attribute_name: &str) -> bool {
        self.config().is_unset(record, attribute_name)
    }

    pub fn is_usable(&self, record: &R, attribute_name: &str) -> bool {
        self.config().is_usable(record, attribute_name)
    }
}

#[cfg(test)]
mod tests {
    use crate::record::Record;
    use crate::test_fixtures::{Blog, Comment, Post};
    use crate::value::Value;

    const USER_NAME: &str = "denormalized_user_name";
    const BODY_LENGTH: &str = "denormalized_body_length";
    const COMMENTS_COUNT: &str = "denormalized_comments_count";
    const IDENTICAL: &str = "denormalized_identical_post_count";

    #[test]
    fn test_stale_by_user_association() {
        let mut blog = Blog::new();
        let mut post = blog.new_poetry();
        let posts = blog.posts.clone();

        assert!(post.has_changes());
        assert!(posts.is_stale(&post, USER_NAME));
        blog.save_post(&mut post).unwrap();
        assert!(!post.has_changes());
        assert!(!posts.is_stale(&post, USER_NAME));

        let other = blog.create_user("some other guy");
        post.set_user(other);
        assert!(posts.is_stale(&post, USER_NAME));
        blog.save_post(&mut post).unwrap();
        assert!(!posts.is_stale(&post, USER_NAME));

        post.user_mut().unwrap().set("name", Value::from("fred"));
        assert!(post.user().unwrap().has_changes());
        assert!(posts.is_stale(&post, USER_NAME));
        blog.save_user(post.user_mut().unwrap());
        assert!(posts.is_stale(&post, USER_NAME));
        blog.save_post(&mut post).unwrap();
        assert!(!posts.is_stale(&post, USER_NAME));
    }

    #[test]
    fn test_null_reloaded_values() {
        let mut blog = Blog::new();
        let mut post = blog.new_poetry();
        let posts = blog.posts.clone();
        blog.save_post(&mut post).unwrap();

        blog.null_column(&post, USER_NAME);
        let post = blog.reload_post(&post);
        assert!(!posts.is_stale(&post, USER_NAME));

        blog.null_column(&post, BODY_LENGTH);
        let post = blog.reload_post(&post);
        assert!(!post.has_changes());
        assert!(post.get(BODY_LENGTH).is_null());
        assert!(!post.get("denormalized_body_length_computed_at").is_null());
        assert!(!posts.config().is_stale_by_own_change(&post, BODY_LENGTH));
        assert!(!posts.config().is_stale_by_association_change(&post, BODY_LENGTH));
        assert!(posts.is_stale(&post, BODY_LENGTH));
    }

    #[test]
    fn test_default_triggers_follow_own_changes() {
        let mut blog = Blog::new();
        let mut post = blog.new_poetry();
        let posts = blog.posts.clone();
        assert!(posts.is_stale(&post, BODY_LENGTH));
        blog.save_post(&mut post).unwrap();
        assert!(!posts.is_stale(&post, BODY_LENGTH));

        post.set("subject", Value::from("foo"));
        assert!(posts.is_stale(&post, BODY_LENGTH));
        assert!(!posts.is_stale(&post, USER_NAME));
        blog.save_post(&mut post).unwrap();
        assert!(!posts.is_stale(&post, BODY_LENGTH));
        assert!(!posts.is_stale(&post, USER_NAME));
    }

    #[test]
    fn test_default_triggers_ignore_associations() {
        let mut blog = Blog::new();
        let mut post = blog.new_poetry();
        let posts = blog.posts.clone();
        blog.save_post(&mut post).unwrap();

        post.user_mut().unwrap().set("name", Value::from("changed"));
        assert!(!posts.is_stale(&post, BODY_LENGTH));
    }

    #[test]
    fn test_stale_with_to_many_association() {
        let mut blog = Blog::new();
        let mut post = blog.new_poetry();
        let posts = blog.posts.clone();

        assert!(posts.is_stale(&post, USER_NAME));
        assert!(!posts.is_stale(&post, COMMENTS_COUNT));
        blog.save_post(&mut post).unwrap();
        assert!(!posts.is_stale(&post, USER_NAME));
        assert!(posts.is_stale(&post, IDENTICAL));
        assert!(!posts.is_stale(&post, COMMENTS_COUNT));

        post.comments.push(Comment::new("yadda"));
        assert!(post.comments[0].has_changes());
        assert!(!posts.is_stale(&post, USER_NAME));
        assert!(posts.is_stale(&post, COMMENTS_COUNT));
        blog.save_post(&mut post).unwrap();
        assert_eq!(post.get(COMMENTS_COUNT), Value::Integer(1));
        assert!(!post.comments[0].is_new());
        assert!(!posts.is_stale(&post, COMMENTS_COUNT));

        post.comments[0].set("body", Value::from("The dog is man's best friend."));
        assert!(!posts.is_stale(&post, USER_NAME));
        assert!(posts.is_stale(&post, COMMENTS_COUNT));
    }

    #[test]
    fn test_missing_owner_timestamp_counts_as_modified() {
        let blog = Blog::new();
        let mut post = Post::new("subject", "body");
        post.set_user(blog.create_user("Ogden"));
        assert!(post.updated_at().is_none());
        assert!(blog.posts.config().is_stale_by_association_change(&post, USER_NAME));
    }

    #[test]
    fn test_always_trigger_never_settles() {
        let mut blog = Blog::new();
        let mut post = blog.new_poetry();
        let posts = blog.posts.clone();
        assert!(posts.is_stale(&post, IDENTICAL));
        blog.save_post(&mut post).unwrap();
        assert!(posts.is_stale(&post, IDENTICAL));
    }

    #[test]
    fn test_invalid_when_null_never_settles_on_null_result() {
        let mut blog = Blog::new();
        let mut post = Post::new("no body", "");
        post.set("body", Value::Null);
        post.set_user(blog.create_user("Ogden"));
        let posts = blog.posts.clone();

        for _ in 0..3 {
            blog.save_post(&mut post).unwrap();
            assert!(post.get(BODY_LENGTH).is_null());
            assert!(posts.is_stale(&post, BODY_LENGTH));
        }
    }

    #[test]
    fn test_unset_and_usable() {
        let mut blog = Blog::new();
        let mut post = blog.new_poetry();
        let posts = blog.posts.clone();

        assert!(posts.is_unset(&post, USER_NAME));
        assert!(!posts.is_unset(&post, IDENTICAL));
        assert!(!posts.is_usable(&post, USER_NAME));
        assert_eq!(posts.config().unset_fields(&post).len(), 3);
        assert!(posts.config().any_unset(&post));

        blog.save_post(&mut post).unwrap();
        assert!(!posts.is_unset(&post, USER_NAME));
        assert!(posts.is_usable(&post, USER_NAME));
        assert!(posts.config().unset_fields(&post).is_empty());

        post.user_mut().unwrap().set("name", Value::from("fred"));
        assert!(posts.is_stale(&post, USER_NAME));
        assert!(posts.is_usable(&post, USER_NAME));
    }

    #[test]
    fn test_stale_fields() {
        let mut blog = Blog::new();
        let mut post = blog.new_poetry();
        let posts = blog.posts.clone();
        blog.save_post(&mut post).unwrap();
        assert_eq!(posts.config().stale_fields(&post), vec![IDENTICAL.to_string()]);
    }

    #[test]
    fn test_unknown_field_is_never_stale() {
        let blog = Blog::new();
        let post = blog.new_poetry();
        assert!(!blog.posts.is_stale(&post, "subject"));
        assert!(!blog.posts.is_unset(&post, "subject"));
    }
}
