//! forge::parsing
//!
//! Repository URL parsing shared by the factory and the services.
//!
//! Accepted forms:
//! - `https://host/namespace/repo` (also `http://`, trailing `.git` or `/`)
//! - `ssh://git@host/namespace/repo.git`
//! - `git@host:namespace/repo.git`
//! - `host/namespace/repo`
//!
//! Every path segment before the last one belongs to the namespace, so GitLab
//! subgroups (`group/subgroup/project`) are kept intact.

use url::Url;

/// A parsed repository location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    /// `https`, `http` or `ssh`
    pub scheme: String,
    /// Host name without port
    pub hostname: String,
    /// Explicit port, if the URL carries one
    pub port: Option<u16>,
    /// Owning user or group path, if the URL has one
    pub namespace: Option<String>,
    /// Repository name without `.git`
    pub repo: String,
}

impl RepoUrl {
    /// Web URL of the hosting instance.
    ///
    /// SSH remotes map to `https`.
    ///
    /// ```
    /// use forgework::forge::parse_git_repo;
    ///
    /// let url = parse_git_repo("git@gitlab.gnome.org:GNOME/gtk.git").unwrap();
    /// assert_eq!(url.instance_url(), "https://gitlab.gnome.org");
    /// ```
    pub fn instance_url(&self) -> String {
        let scheme = if self.scheme == "ssh" {
            "https"
        } else {
            self.scheme.as_str()
        };
        match self.port {
            Some(port) if self.scheme != "ssh" => {
                format!("{}://{}:{}", scheme, self.hostname, port)
            }
            _ => format!("{}://{}", scheme, self.hostname),
        }
    }
}

/// Parse a git remote or web URL.
///
/// Returns `None` when no host or repository name can be found.
///
/// # Example
///
/// ```
/// use forgework::forge::parse_git_repo;
///
/// let url = parse_git_repo("https://github.com/packit/ogr.git").unwrap();
/// assert_eq!(url.hostname, "github.com");
/// assert_eq!(url.namespace.as_deref(), Some("packit"));
/// assert_eq!(url.repo, "ogr");
/// ```
pub fn parse_git_repo(potential_url: &str) -> Option<RepoUrl> {
    let trimmed = potential_url.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = if trimmed.contains("://") {
        trimmed.to_string()
    } else if let Some((user_host, path)) = scp_like(trimmed) {
        format!("ssh://{}/{}", user_host, path)
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&normalized).ok()?;
    let hostname = parsed.host_str()?.to_string();
    if !hostname.contains('.') && hostname != "localhost" && !trimmed.contains("://") {
        // "owner/repo" is not a host-qualified URL
        return None;
    }

    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();
    let (last, rest) = segments.split_last()?;
    let repo = last.strip_suffix(".git").unwrap_or(last);
    if repo.is_empty() {
        return None;
    }

    let namespace = if rest.is_empty() {
        None
    } else {
        Some(rest.join("/"))
    };

    Some(RepoUrl {
        scheme: parsed.scheme().to_string(),
        hostname,
        port: parsed.port(),
        namespace,
        repo: repo.to_string(),
    })
}

/// Split `user@host:path` into `(user@host, path)`.
fn scp_like(url: &str) -> Option<(&str, &str)> {
    let (user_host, path) = url.split_once(':')?;
    if !user_host.contains('@') || path.starts_with("//") {
        return None;
    }
    Some((user_host, path.trim_start_matches('/')))
}
