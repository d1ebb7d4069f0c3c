//! Static website material: bucket naming, access policy, index page.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Longest prefix that still leaves room for the timestamp and suffix
pub const MAX_BUCKET_PREFIX_LEN: usize = 63 - 27;

/// Generate a globally unique bucket name.
///
/// Format: `<prefix>-<YYYY-MM-DD-HH-MM-SS>-<6 hex>`. The random suffix keeps
/// names generated within the same second apart.
pub fn bucket_name(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        prefix.to_ascii_lowercase(),
        now.format("%Y-%m-%d-%H-%M-%S"),
        &suffix[..6]
    )
}

/// Check a bucket name against the S3 naming rules
pub fn validate_bucket_name(name: &str) -> Result<(), String> {
    if name.len() < 3 || name.len() > 63 {
        return Err(format!(
            "bucket name '{}' must be 3-63 characters (got {})",
            name,
            name.len()
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(format!(
            "bucket name '{}' may only contain lowercase letters, digits, '-' and '.'",
            name
        ));
    }

    let first = name.chars().next().unwrap_or('-');
    let last = name.chars().last().unwrap_or('-');
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(format!(
            "bucket name '{}' must start and end with a letter or digit",
            name
        ));
    }

    if name.contains("..") {
        return Err(format!("bucket name '{}' must not contain '..'", name));
    }

    Ok(())
}

/// Public-read access policy for every object in the bucket
pub fn public_read_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Sid": "PublicReadGetObject",
                "Effect": "Allow",
                "Principal": "*",
                "Action": "s3:GetObject",
                "Resource": format!("arn:aws:s3:::{}/*", bucket),
            }
        ],
    })
    .to_string()
}

/// Index page linking the relayed image
pub fn index_page(image_key: &str) -> String {
    format!(
        r#"<html>
<body>
<h1>Hello World - Static S3 Website</h1>
<p>This is a static website hosted in an S3 bucket</p>
<img src="{}" alt="Website image" />
</body>
</html>
"#,
        image_key
    )
}

/// Public URL of the bucket website endpoint
pub fn website_url(bucket: &str, region: &str) -> String {
    format!("http://{}.s3-website-{}.amazonaws.com", bucket, region)
}

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
