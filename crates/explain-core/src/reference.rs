use crate::error::ExplainError;
use crate::types::RepositoryRef;

const SSH_PREFIX: &str = "git@github.com:";
const BARE_HOST_PREFIX: &str = "github.com/";
const GITHUB_HOSTS: [&str; 2] = ["github.com", "www.github.com"];

/// Resolve a user-supplied repository reference into a [`RepositoryRef`].
///
/// Accepted shapes, tried in this order (the first match wins):
///
/// 1. `https//…` / `http//…` typos are repaired first
/// 2. SSH: `git@github.com:owner/repo[.git]`
/// 3. bare host: `github.com/owner/repo` (rewritten to HTTPS)
/// 4. URL: `http(s)://[www.]github.com/owner/repo[/…][?…][#…]`
/// 5. bare `owner/repo`
///
/// Never touches the network.
///
/// # Errors
///
/// - [`ExplainError::UnsupportedHost`] for URLs on any host but github.com
/// - [`ExplainError::MissingRepository`] for GitHub URLs with fewer than two
///   path segments
/// - [`ExplainError::InvalidReference`] for everything else that does not match
///
/// # Examples
///
/// ```
/// use explain_core::resolve;
///
/// let a = resolve("git@github.com:tokio-rs/tokio.git").unwrap();
/// let b = resolve("https://github.com/tokio-rs/tokio").unwrap();
/// let c = resolve("github.com/tokio-rs/tokio").unwrap();
/// let d = resolve("tokio-rs/tokio").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(b, c);
/// assert_eq!(c, d);
/// ```
pub fn resolve(input: &str) -> Result<RepositoryRef, ExplainError> {
    let mut target = input.trim().to_string();

    if let Some(rest) = target.strip_prefix("https//") {
        target = format!("https://{rest}");
    } else if let Some(rest) = target.strip_prefix("http//") {
        target = format!("http://{rest}");
    }

    if let Some(path) = target.strip_prefix(SSH_PREFIX) {
        let Some((owner, repo)) = path.split_once('/') else {
            return Err(ExplainError::InvalidReference(input.trim().to_string()));
        };
        return checked(input, owner, strip_git_suffix(repo));
    }

    if target.starts_with(BARE_HOST_PREFIX) {
        target = format!("https://{target}");
    }

    if let Some(rest) = target
        .strip_prefix("https://")
        .or_else(|| target.strip_prefix("http://"))
    {
        return resolve_url(input, rest);
    }

    if target.matches('/').count() == 1 {
        if let Some((owner, repo)) = target.split_once('/') {
            if !owner.is_empty() && !repo.is_empty() {
                return checked(input, owner, repo);
            }
        }
    }

    Err(ExplainError::InvalidReference(input.trim().to_string()))
}

/// Resolve the part of a URL after `scheme://`.
fn resolve_url(input: &str, after_scheme: &str) -> Result<RepositoryRef, ExplainError> {
    let authority_end = after_scheme
        .find(['/', '?', '#'])
        .unwrap_or(after_scheme.len());
    let (host, rest) = after_scheme.split_at(authority_end);

    let host = host.to_lowercase();
    if !GITHUB_HOSTS.contains(&host.as_str()) {
        return Err(ExplainError::UnsupportedHost(host));
    }

    let path_end = rest.find(['?', '#']).unwrap_or(rest.len());
    let parts: Vec<&str> = rest[..path_end].split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return Err(ExplainError::MissingRepository(input.trim().to_string()));
    }

    checked(input, parts[0], strip_git_suffix(parts[1]))
}

fn strip_git_suffix(repo: &str) -> &str {
    repo.strip_suffix(".git").unwrap_or(repo)
}

/// Enforce the `RepositoryRef` invariant on the final pair.
fn checked(input: &str, owner: &str, repo: &str) -> Result<RepositoryRef, ExplainError> {
    let valid = |s: &str| !s.is_empty() && !s.contains(['/', '\\']);
    if !valid(owner) || !valid(repo) {
        return Err(ExplainError::InvalidReference(input.trim().to_string()));
    }
    Ok(RepositoryRef::new(owner, repo))
}
