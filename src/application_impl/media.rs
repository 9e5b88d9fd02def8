use crate::domain_model::*;

/// Builds public object-store URLs the same way the upload side does:
/// `{prefix}{namespace}/{owner_id}/{file_name}`. Missing files resolve to
/// the configured defaults so display code never deals with absent images.
#[derive(Debug, Clone)]
pub struct PublicUrlBuilder {
    prefix: String,
    default_avatar: String,
    default_listing_thumb: String,
}

impl PublicUrlBuilder {
    pub fn new(
        prefix: impl Into<String>,
        default_avatar: impl Into<String>,
        default_listing_thumb: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            default_avatar: default_avatar.into(),
            default_listing_thumb: default_listing_thumb.into(),
        }
    }

    pub fn public_url(&self, namespace: &str, owner_id: i64, file_name: &str) -> String {
        format!("{}{}/{}/{}", self.prefix, namespace, owner_id, file_name)
    }

    pub fn member_avatar_url(&self, member_id: MemberId, file_name: Option<&str>) -> String {
        match file_name {
            Some(name) if !name.trim().is_empty() => self.public_url("member", member_id.0, name),
            _ => self.default_avatar.clone(),
        }
    }

    pub fn listing_thumb_url(&self, listing_id: ListingId, file_name: Option<&str>) -> String {
        match file_name {
            Some(name) if !name.trim().is_empty() => self.public_url("listing", listing_id.0, name),
            _ => self.default_listing_thumb.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PublicUrlBuilder {
        PublicUrlBuilder::new("https://cdn.example.com/", "/user.png", "/no-image.png")
    }

    #[test]
    fn builds_namespaced_urls() {
        let urls = builder();
        assert_eq!(
            urls.member_avatar_url(MemberId(9), Some("me.jpg")),
            "https://cdn.example.com/member/9/me.jpg"
        );
        assert_eq!(
            urls.listing_thumb_url(ListingId(42), Some("bike.png")),
            "https://cdn.example.com/listing/42/bike.png"
        );
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let urls = builder();
        assert_eq!(urls.member_avatar_url(MemberId(9), None), "/user.png");
        assert_eq!(urls.member_avatar_url(MemberId(9), Some("  ")), "/user.png");
        assert_eq!(urls.listing_thumb_url(ListingId(1), None), "/no-image.png");
    }
}
