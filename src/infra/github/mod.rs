// GitHub infra layer.
// - `github_client.rs` talks to the GitHub HTTP API.

#[path = "github_client.rs"]
pub mod github_client;

pub use github_client::GithubApiClient;
