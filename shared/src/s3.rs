use anyhow::Result;
use aws_smithy_http::byte_stream::ByteStream;

pub async fn client() -> aws_sdk_s3::Client {
    let aws_config = aws_config::load_from_env().await;
    aws_sdk_s3::Client::new(&aws_config)
}

/// HeadBucket probe; a denied or missing bucket both count as absent.
pub async fn bucket_exists(s3: &aws_sdk_s3::Client, bucket: &str) -> bool {
    s3.head_bucket().bucket(bucket).send().await.is_ok()
}

pub async fn put_bytes(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    content_type: &str,
    bytes: Vec<u8>,
) -> Result<()> {
    s3.put_object()
        .bucket(bucket)
        .key(key)
        .content_type(content_type)
        .body(ByteStream::from(bytes))
        .send()
        .await?;

    Ok(())
}
