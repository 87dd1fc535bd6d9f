pub mod emoncms;
pub mod error;
pub mod octopus;

use reqwest::Response;

use self::error::ApiError;

/// Read the body of a reply, turning transport failures and non-success
/// statuses into `ApiError`.
pub(crate) async fn read_body(endpoint: &str, response: Result<Response, reqwest::Error>) -> Result<String, ApiError> {
    let response = response.map_err(|source| ApiError::Transport {
        endpoint: endpoint.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status,
        });
    }

    response.text().await.map_err(|source| ApiError::Transport {
        endpoint: endpoint.to_string(),
        source,
    })
}
