//! Identity wrappers for repositories, tokens, and the GraphQL endpoint.

use std::fmt;

use url::Url;

use super::error::WatchError;

/// Default GitHub API base URL.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Repository owner wrapper to avoid stringly typed parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryOwner(String);

impl RepositoryOwner {
    pub(crate) fn new(value: &str) -> Result<Self, WatchError> {
        validate_segment("repository owner", value)?;
        Ok(Self(value.to_owned()))
    }

    /// Borrow the owner value.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Repository name wrapper to prevent parameter mix-ups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryName(String);

impl RepositoryName {
    pub(crate) fn new(value: &str) -> Result<Self, WatchError> {
        validate_segment("repository name", value)?;
        Ok(Self(value.to_owned()))
    }

    /// Borrow the repository name.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn validate_segment(what: &str, value: &str) -> Result<(), WatchError> {
    if value.is_empty() || value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(WatchError::Configuration {
            message: format!("{what} `{value}` is not valid"),
        });
    }
    Ok(())
}

/// Owner and name of a repository, written `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryLocator {
    owner: RepositoryOwner,
    name: RepositoryName,
}

impl RepositoryLocator {
    /// Parses `owner/name`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Configuration`] when either segment is missing
    /// or contains whitespace.
    pub fn parse(input: &str) -> Result<Self, WatchError> {
        let trimmed = input.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| WatchError::Configuration {
                message: format!("repository `{trimmed}` must be written owner/name"),
            })?;
        Self::from_owner_repo(owner, name)
    }

    /// Creates a locator from separate owner and repository values.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Configuration`] when either value is invalid.
    pub fn from_owner_repo(owner: &str, name: &str) -> Result<Self, WatchError> {
        Ok(Self {
            owner: RepositoryOwner::new(owner)?,
            name: RepositoryName::new(name)?,
        })
    }

    /// Repository owner.
    #[must_use]
    pub const fn owner(&self) -> &RepositoryOwner {
        &self.owner
    }

    /// Repository name.
    #[must_use]
    pub const fn name(&self) -> &RepositoryName {
        &self.name
    }

    /// The `owner/name` form used as the repository's key.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner.as_str(), self.name.as_str())
    }
}

impl fmt::Display for RepositoryLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner.as_str(), self.name.as_str())
    }
}

/// Personal access token wrapper enforcing presence.
#[derive(Clone, PartialEq, Eq)]
pub struct PersonalAccessToken(String);

impl PersonalAccessToken {
    /// Validates that the token is non-empty and trims whitespace.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::MissingToken` when the supplied string is blank.
    pub fn new(token: impl AsRef<str>) -> Result<Self, WatchError> {
        let trimmed = token.as_ref().trim();
        if trimmed.is_empty() {
            return Err(WatchError::MissingToken);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the token value.
    #[must_use]
    pub const fn value(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for PersonalAccessToken {
    fn as_ref(&self) -> &str {
        self.value()
    }
}

impl fmt::Debug for PersonalAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PersonalAccessToken(***)")
    }
}

/// Derives the GraphQL endpoint from a REST API base URL.
///
/// `https://api.github.com` maps to `https://api.github.com/graphql`, while
/// an enterprise base such as `https://ghe.example.com/api/v3` maps to
/// `https://ghe.example.com/api/graphql`. Any other base gets `/graphql`
/// appended, which is also what local test servers expect.
///
/// # Errors
///
/// Returns [`WatchError::InvalidUrl`] when `api_url` cannot be parsed.
pub fn graphql_endpoint(api_url: &str) -> Result<Url, WatchError> {
    let mut parsed =
        Url::parse(api_url).map_err(|error| WatchError::InvalidUrl(error.to_string()))?;

    let base_path = parsed.path().trim_end_matches('/').to_owned();
    let graphql_path = base_path
        .strip_suffix("/api/v3")
        .map_or_else(|| format!("{base_path}/graphql"), |root| format!("{root}/api/graphql"));
    parsed.set_path(&graphql_path);
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{PersonalAccessToken, RepositoryLocator, WatchError, graphql_endpoint};

    #[rstest]
    fn parses_owner_and_name() {
        let locator = RepositoryLocator::parse(" octo/widgets ").expect("should parse");
        assert_eq!(locator.owner().as_str(), "octo");
        assert_eq!(locator.name().as_str(), "widgets");
        assert_eq!(locator.full_name(), "octo/widgets");
    }

    #[rstest]
    #[case::no_slash("octo")]
    #[case::empty_owner("/widgets")]
    #[case::empty_name("octo/")]
    #[case::nested("octo/widgets/extra")]
    #[case::space("octo/wid gets")]
    fn rejects_malformed_repositories(#[case] input: &str) {
        let result = RepositoryLocator::parse(input);
        assert!(
            matches!(result, Err(WatchError::Configuration { .. })),
            "expected configuration error for {input}, got {result:?}"
        );
    }

    #[rstest]
    fn token_is_trimmed_and_hidden_from_debug() {
        let token = PersonalAccessToken::new("  ghp_secret ").expect("token should be valid");
        assert_eq!(token.value(), "ghp_secret");
        assert!(!format!("{token:?}").contains("secret"));
        assert_eq!(
            PersonalAccessToken::new("   "),
            Err(WatchError::MissingToken)
        );
    }

    #[rstest]
    #[case::public("https://api.github.com", "https://api.github.com/graphql")]
    #[case::trailing_slash("https://api.github.com/", "https://api.github.com/graphql")]
    #[case::enterprise("https://ghe.example.com/api/v3", "https://ghe.example.com/api/graphql")]
    #[case::local("http://127.0.0.1:8080", "http://127.0.0.1:8080/graphql")]
    fn derives_graphql_endpoint(#[case] api_url: &str, #[case] expected: &str) {
        let endpoint = graphql_endpoint(api_url).expect("endpoint should derive");
        assert_eq!(endpoint.as_str(), expected);
    }
}
