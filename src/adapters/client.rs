use log::{debug, warn};
use rusoto_core::{HttpClient, Region};
use rusoto_credential::StaticProvider;
use rusoto_s3::S3Client;

use crate::constants::{ERROR_FAILED_TO_CONNECT, S3_DEFAULT_REGION};
use crate::error::{Error, Result};

/// Create an S3 client for an S3-compatible endpoint.
///
/// The endpoint is always named explicitly, so the client is built on a
/// custom region. A region name that rusoto does not recognise is kept for
/// request signing but logged, since most non-AWS endpoints expect the default.
pub fn create_s3_client(
    endpoint: &str,
    region_name: Option<&str>,
    access_key: &str,
    secret_key: &str,
) -> Result<S3Client> {
    let name = match region_name {
        Some(name) if !name.is_empty() => {
            if name.parse::<Region>().is_err() {
                warn!("Unrecognised region '{}', using it for signing only", name);
            }
            name.to_string()
        }
        _ => S3_DEFAULT_REGION.to_string(),
    };

    let region = Region::Custom {
        name,
        endpoint: endpoint.to_string(),
    };

    let provider = StaticProvider::new_minimal(access_key.to_string(), secret_key.to_string());

    let http = HttpClient::new().map_err(|e| {
        Error::transport(format!("{} to {}", ERROR_FAILED_TO_CONNECT, endpoint), e)
    })?;

    debug!("Created S3 client for {} ({:?})", endpoint, region);

    Ok(S3Client::new_with(http, provider, region))
}
