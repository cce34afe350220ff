//! Twitter API client for the social-verification gate
//!
//! Read-only v2 queries: resolve a username to an id, check follow status
//! against a target account, check retweet status against a tweet.
//!
//! Every operation fails closed: a missing bearer token, a non-success
//! response, or a transport error makes lookups report absent and the
//! membership checks report false. Verification that cannot be performed
//! reads as "requirement not met", never as an error to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const TWITTER_API_BASE: &str = "https://api.twitter.com/2";

/// Page size for the followee listing (API maximum).
///
/// Only the first page is ever fetched: a user following more accounts
/// than one page holds can read as "not following" even when they do.
/// Accepted as cost control; the target account is checked by id, so the
/// window only opens past this many followees.
const FOLLOWING_PAGE_SIZE: u32 = 1000;

/// Page size for the retweeter listing (API maximum, one page only)
const RETWEETERS_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterUser {
    pub id: String,
    pub username: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Single-object v2 envelope; `data` is absent on lookup misses
#[derive(Debug, Deserialize)]
struct UserResponse {
    data: Option<TwitterUser>,
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: Option<Tweet>,
}

/// List envelope; `data` is omitted entirely for empty lists
#[derive(Debug, Deserialize)]
struct UserListResponse {
    #[serde(default)]
    data: Vec<TwitterUser>,
}

#[derive(Clone)]
pub struct TwitterClient {
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl TwitterClient {
    pub fn new(bearer_token: Option<String>) -> Self {
        if bearer_token.is_none() {
            warn!("Twitter client initialized WITHOUT bearer token - all checks will fail closed");
        }
        Self {
            client: reqwest::Client::new(),
            bearer_token,
        }
    }

    fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .header("User-Agent", "poap-gate/0.1.0");

        if let Some(token) = &self.bearer_token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        req
    }

    /// Resolve a username to a user object. Absent on lookup failure.
    pub async fn get_user_by_username(&self, username: &str) -> Option<TwitterUser> {
        let url = format!("{}/users/by/username/{}", TWITTER_API_BASE, username);

        let response = match self.build_request(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Twitter user lookup failed for {}: {}", username, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                "Twitter user lookup for {} returned {}",
                username,
                response.status()
            );
            return None;
        }

        match response.json::<UserResponse>().await {
            Ok(body) => body.data,
            Err(e) => {
                warn!("Failed to parse Twitter user response: {}", e);
                None
            }
        }
    }

    /// Whether `user_id` follows `target_username`.
    ///
    /// The target is resolved to an id first; resolution failure reads as
    /// not following. Membership is checked by id against the first page
    /// of the user's followee list.
    pub async fn is_following(&self, user_id: &str, target_username: &str) -> bool {
        let Some(target) = self.get_user_by_username(target_username).await else {
            debug!("Follow target {} did not resolve", target_username);
            return false;
        };

        let url = format!(
            "{}/users/{}/following?user.fields=id,username&max_results={}",
            TWITTER_API_BASE, user_id, FOLLOWING_PAGE_SIZE
        );

        self.fetch_user_page(&url)
            .await
            .iter()
            .any(|u| u.id == target.id)
    }

    /// Whether `user_id` appears in the first page of the tweet's
    /// retweeter list.
    pub async fn has_retweeted(&self, user_id: &str, tweet_id: &str) -> bool {
        let url = format!(
            "{}/tweets/{}/retweeted_by?max_results={}",
            TWITTER_API_BASE, tweet_id, RETWEETERS_PAGE_SIZE
        );

        self.fetch_user_page(&url).await.iter().any(|u| u.id == user_id)
    }

    /// Fetch a tweet with author and timestamp fields
    pub async fn get_tweet(&self, tweet_id: &str) -> Option<Tweet> {
        let url = format!(
            "{}/tweets/{}?tweet.fields=author_id,created_at",
            TWITTER_API_BASE, tweet_id
        );

        let response = match self.build_request(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Tweet lookup failed for {}: {}", tweet_id, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Tweet lookup for {} returned {}", tweet_id, response.status());
            return None;
        }

        match response.json::<TweetResponse>().await {
            Ok(body) => body.data,
            Err(e) => {
                warn!("Failed to parse tweet response: {}", e);
                None
            }
        }
    }

    /// Fetch one page of a user list. Any failure degrades to an empty
    /// list, so membership checks fail closed.
    async fn fetch_user_page(&self, url: &str) -> Vec<TwitterUser> {
        let response = match self.build_request(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Twitter list fetch failed: {}", e);
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!("Twitter list fetch returned {}", response.status());
            return Vec::new();
        }

        match response.json::<UserListResponse>().await {
            Ok(body) => body.data,
            Err(e) => {
                warn!("Failed to parse Twitter list response: {}", e);
                Vec::new()
            }
        }
    }
}
