//! Dispatch metadata exposed to handlers.
//!
//! The forwarding itself belongs to the container; the facade only says how the current
//! invocation was reached and resolves dispatch targets relative to the request.

/// How the current handler invocation was reached.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum DispatcherType {
    #[default]
    Request,
    Forward,
    Include,
    Async,
    Error,
}

/// A resolved dispatch target, handed to the container to forward or include.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestDispatcher {
    path: String,
}

impl RequestDispatcher {
    /// Resolves `target` against `current_path`.
    ///
    /// Absolute targets are kept as they are, relative targets are resolved against the
    /// directory of `current_path`. `None` when the target is empty or climbs above the root.
    pub fn resolve(current_path: &str, target: &str) -> Option<Self> {
        if target.is_empty() {
            return None;
        }

        let (target_path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        let joined = if target_path.starts_with('/') {
            target_path.to_string()
        } else {
            let base = current_path.rfind('/').map_or("/", |pos| &current_path[..=pos]);
            format!("{base}{target_path}")
        };

        let mut path = normalize(&joined)?;
        if let Some(query) = query {
            path.push('?');
            path.push_str(query);
        }
        Some(Self { path })
    }

    /// Target path, with its query string if it had one.
    pub fn path(&self) -> &str {
        &self.path
    }
}

fn normalize(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    let mut normalized = format!("/{}", segments.join("/"));
    if path.ends_with('/') && !segments.is_empty() {
        normalized.push('/');
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(current: &str, target: &str) -> Option<String> {
        RequestDispatcher::resolve(current, target).map(|d| d.path().to_string())
    }

    #[test]
    fn absolute_targets() {
        assert_eq!(resolve("/shop/cart", "/login"), Some("/login".into()));
        assert_eq!(resolve("/shop/cart", "/a/./b/../c?x=1"), Some("/a/c?x=1".into()));
    }

    #[test]
    fn relative_targets() {
        assert_eq!(resolve("/shop/cart", "checkout"), Some("/shop/checkout".into()));
        assert_eq!(resolve("/shop/cart/", "items/"), Some("/shop/cart/items/".into()));
        assert_eq!(resolve("/shop/cart", "../help"), Some("/help".into()));
        assert_eq!(resolve("", "index"), Some("/index".into()));
    }

    #[test]
    fn invalid_targets() {
        assert_eq!(resolve("/shop/cart", ""), None);
        assert_eq!(resolve("/shop", "../../etc"), None);
    }
}
