//! MongoDB implementation of the document store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, Collection, Cursor, IndexModel};

use crate::interfaces::document_store::{
    AuthorStore, AuthorUpsert, PostScan, PostStore, Result, StorageError,
};
use crate::model::{Author, NewPost, Post, PostChanges, PostId, SortKey};

/// Collection names.
const AUTHORS_COLLECTION: &str = "appusers";
const POSTS_COLLECTION: &str = "posts";

/// Field the author lookup stage writes the joined records into.
const JOINED_AUTHOR: &str = "author";

const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB implementation of `AuthorStore` and `PostStore`.
pub struct MongoDocumentStore {
    authors: Collection<Document>,
    posts: Collection<Document>,
}

impl MongoDocumentStore {
    /// Create a new MongoDB document store.
    pub async fn new(client: &Client, database_name: &str) -> Result<Self> {
        let database = client.database(database_name);
        let store = Self {
            authors: database.collection(AUTHORS_COLLECTION),
            posts: database.collection(POSTS_COLLECTION),
        };
        store.init().await?;
        Ok(store)
    }

    /// Initialize indexes.
    async fn init(&self) -> Result<()> {
        // The unique username index is what serializes concurrent upserts.
        let username_index = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.authors.create_index(username_index).await?;

        let listing_index = IndexModel::builder()
            .keys(doc! { "authorUsername": 1, "creationTime": -1 })
            .build();
        self.posts.create_index(listing_index).await?;

        Ok(())
    }

    async fn upsert_once(&self, username: &str, active: bool) -> Result<bool> {
        let result = self
            .authors
            .update_one(
                doc! { "username": username },
                doc! {
                    "$set": { "active": active },
                    "$setOnInsert": { "username": username },
                },
            )
            .upsert(true)
            .await?;
        Ok(result.upserted_id.is_some())
    }

    fn scan_options(scan: &PostScan) -> FindOptions {
        FindOptions::builder()
            .sort(sort_document(scan.sort))
            .skip(scan.page.skip())
            .limit(limit_of(scan))
            .build()
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

fn sort_document(key: SortKey) -> Document {
    let mut sort = Document::new();
    sort.insert(key.field(), -1);
    sort.insert("_id", -1);
    sort
}

fn limit_of(scan: &PostScan) -> i64 {
    i64::try_from(scan.page.limit()).unwrap_or(i64::MAX)
}

fn post_filter(author: Option<&str>, enabled: Option<bool>) -> Document {
    let mut filter = Document::new();
    if let Some(author) = author {
        filter.insert("authorUsername", author);
    }
    if let Some(enabled) = enabled {
        filter.insert("enabled", enabled);
    }
    filter
}

fn parse_object_id(id: &PostId) -> Option<ObjectId> {
    ObjectId::parse_str(id.as_str()).ok()
}

fn to_bson_time(time: DateTime<Utc>) -> mongodb::bson::DateTime {
    mongodb::bson::DateTime::from_millis(time.timestamp_millis())
}

fn malformed(field: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::Malformed(format!("{field}: {err}"))
}

fn author_from_document(doc: &Document) -> Result<Author> {
    Ok(Author {
        id: doc
            .get_object_id("_id")
            .map_err(|e| malformed("_id", e))?
            .to_hex(),
        username: doc
            .get_str("username")
            .map_err(|e| malformed("username", e))?
            .to_string(),
        active: doc.get_bool("active").unwrap_or(false),
    })
}

fn post_from_document(doc: &Document) -> Result<Post> {
    let millis = doc
        .get_datetime("creationTime")
        .map_err(|e| malformed("creationTime", e))?
        .timestamp_millis();
    let creation_time = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| malformed("creationTime", millis))?;

    Ok(Post {
        id: PostId::new(
            doc.get_object_id("_id")
                .map_err(|e| malformed("_id", e))?
                .to_hex(),
        ),
        message: doc
            .get_str("message")
            .map_err(|e| malformed("message", e))?
            .to_string(),
        creation_time,
        author_username: doc
            .get_str("authorUsername")
            .map_err(|e| malformed("authorUsername", e))?
            .to_string(),
        enabled: doc.get_bool("enabled").unwrap_or(true),
    })
}

async fn collect_posts(mut cursor: Cursor<Document>) -> Result<Vec<Post>> {
    let mut posts = Vec::new();
    while cursor.advance().await? {
        posts.push(post_from_document(&cursor.deserialize_current()?)?);
    }
    Ok(posts)
}

#[async_trait]
impl AuthorStore for MongoDocumentStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Author>> {
        self.authors
            .find_one(doc! { "username": username })
            .await?
            .map(|doc| author_from_document(&doc))
            .transpose()
    }

    async fn upsert_active(&self, username: &str, active: bool) -> Result<Option<AuthorUpsert>> {
        // Two racing upserts can both miss and both try to insert; the unique
        // index rejects one, and its retry then matches the winner's record.
        let created = match self.upsert_once(username, active).await {
            Err(StorageError::Mongo(err)) if is_duplicate_key(&err) => {
                self.upsert_once(username, active).await?
            }
            other => other?,
        };

        Ok(self
            .find_by_username(username)
            .await?
            .map(|author| AuthorUpsert { author, created }))
    }
}

#[async_trait]
impl PostStore for MongoDocumentStore {
    async fn insert(&self, post: NewPost) -> Result<Post> {
        let doc = doc! {
            "message": &post.message,
            "creationTime": to_bson_time(post.creation_time),
            "authorUsername": &post.author_username,
            "enabled": post.enabled,
        };
        let result = self.posts.insert_one(doc).await?;
        let id = match result.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => return Err(StorageError::InvalidId(other.to_string())),
        };

        Ok(Post {
            id: PostId::new(id),
            message: post.message,
            creation_time: post.creation_time,
            author_username: post.author_username,
            enabled: post.enabled,
        })
    }

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>> {
        let Some(oid) = parse_object_id(id) else {
            return Ok(None);
        };
        self.posts
            .find_one(doc! { "_id": oid })
            .await?
            .map(|doc| post_from_document(&doc))
            .transpose()
    }

    async fn find_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>> {
        let oids: Vec<ObjectId> = ids.iter().filter_map(parse_object_id).collect();
        if oids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self.posts.find(doc! { "_id": { "$in": oids } }).await?;
        collect_posts(cursor).await
    }

    async fn update(&self, id: &PostId, changes: &PostChanges) -> Result<Option<Post>> {
        let Some(oid) = parse_object_id(id) else {
            return Ok(None);
        };
        let result = self
            .posts
            .update_one(
                doc! { "_id": oid },
                doc! { "$set": { "message": &changes.message, "enabled": changes.enabled } },
            )
            .await?;
        if result.matched_count == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn scan(&self, author: Option<&str>, scan: &PostScan) -> Result<Vec<Post>> {
        let cursor = self
            .posts
            .find(post_filter(author, scan.enabled))
            .with_options(Self::scan_options(scan))
            .await?;
        collect_posts(cursor).await
    }

    async fn scan_active_author(&self, author: &str, scan: &PostScan) -> Result<Vec<Post>> {
        let mut predicates = Document::new();
        predicates.insert(format!("{JOINED_AUTHOR}.username"), author);
        predicates.insert(format!("{JOINED_AUTHOR}.active"), true);
        if let Some(enabled) = scan.enabled {
            predicates.insert("enabled", enabled);
        }

        let pipeline = vec![
            doc! {
                "$lookup": {
                    "from": AUTHORS_COLLECTION,
                    "localField": "authorUsername",
                    "foreignField": "username",
                    "as": JOINED_AUTHOR,
                }
            },
            doc! { "$match": predicates },
            doc! { "$sort": sort_document(scan.sort) },
            doc! { "$skip": i64::try_from(scan.page.skip()).unwrap_or(i64::MAX) },
            doc! { "$limit": limit_of(scan) },
        ];

        let cursor = self.posts.aggregate(pipeline).await?;
        collect_posts(cursor).await
    }
}
