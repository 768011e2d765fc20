//! Name - splitting `repo[:tag]` references and resolving their registry.

/// Registry assumed for names without an explicit registry component.
pub const DEFAULT_REGISTRY: &str = "docker.io";

pub const DEFAULT_TAG: &str = "latest";

/// Split `repo[:tag]` (or `repo@digest`) into its parts.
///
/// A `:` followed by a `/` belongs to a registry port, not a tag, so
/// `localhost:5000/app` has no tag. Never fails: anything unparseable comes
/// back whole with no tag.
pub fn parse_repository_tag(reference: &str) -> (String, Option<String>) {
    if let Some((repo, digest)) = reference.rsplit_once('@') {
        return (repo.to_string(), Some(digest.to_string()));
    }
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), Some(tag.to_string())),
        _ => (reference.to_string(), None),
    }
}

/// Normalize a `name` / `tag` pair: a tag embedded in `name` wins.
pub fn resolve_name_tag(name: &str, tag: &str) -> (String, String) {
    match parse_repository_tag(name) {
        (repo, Some(embedded)) if !repo.is_empty() && !embedded.is_empty() => (repo, embedded),
        _ => (name.to_string(), tag.to_string()),
    }
}

/// Resolve `(registry, repo_name)` for a repository path.
///
/// The first path component is a registry when it looks like a host
/// (contains `.` or `:`, or is `localhost`); otherwise the default registry
/// is assumed. Returns `None` when no registry can be resolved.
pub fn resolve_repository_name(repository: &str) -> Option<(String, String)> {
    if repository.is_empty() || repository.contains("://") {
        return None;
    }

    let (index, remote) = match repository.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), rest.to_string())
        }
        _ => (DEFAULT_REGISTRY.to_string(), repository.to_string()),
    };

    if index.starts_with('-') || index.ends_with('-') || remote.is_empty() {
        return None;
    }

    let index = if index == format!("index.{}", DEFAULT_REGISTRY) {
        DEFAULT_REGISTRY.to_string()
    } else {
        index
    };

    Some((index, remote))
}
