//! The path pattern tree.
//!
//! A trie over path segments. Each node has literal children, an optional
//! single-wildcard child (`*`, exactly one segment), an optional
//! multi-wildcard terminal (`**`, zero or more trailing segments, only
//! legal as the final pattern segment) and an optional exact terminal.
//!
//! Matching descends greedily: a literal child wins over the single
//! wildcard, and there is no backtracking. The deepest `**` seen along
//! the way is the fallback when descent dead-ends. The empty segment of a
//! trailing slash is kept, so `/x` and `/x/` are different paths.

use std::collections::HashMap;
use std::sync::Arc;

use coral_http::handler::RequestHandler;
use thiserror::Error;

/// Errors from registering a route pattern.
#[derive(Error, Debug)]
pub enum RouteError {
    /// Patterns must start with `/`
    #[error("invalid route pattern '{pattern}': must start with '/'")]
    InvalidPattern { pattern: String },

    /// `**` may only appear as the final segment
    #[error("invalid route pattern '{pattern}': '**' is only allowed as the last segment")]
    MultiWildcardNotLast { pattern: String },
}

/// One parsed pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Single,
    Multi,
}

/// Parses a pattern into segments, validating the `**` placement rule.
pub(crate) fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, RouteError> {
    let Some(rest) = pattern.strip_prefix('/') else {
        return Err(RouteError::InvalidPattern { pattern: pattern.to_string() });
    };

    let parts: Vec<&str> = rest.split('/').collect();
    let mut segments = Vec::with_capacity(parts.len());
    for (index, part) in parts.iter().enumerate() {
        match *part {
            "*" => segments.push(Segment::Single),
            "**" => {
                if index + 1 != parts.len() {
                    return Err(RouteError::MultiWildcardNotLast { pattern: pattern.to_string() });
                }
                segments.push(Segment::Multi);
            }
            literal => segments.push(Segment::Literal(literal.to_string())),
        }
    }
    Ok(segments)
}

/// Splits a request path into segments, keeping a trailing empty segment.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    path.strip_prefix('/').unwrap_or(path).split('/').collect()
}

type SharedHandler = Arc<dyn RequestHandler>;

#[derive(Default)]
struct PatternNode {
    literals: HashMap<String, PatternNode>,
    single: Option<Box<PatternNode>>,
    multi: Option<SharedHandler>,
    terminal: Option<SharedHandler>,
}

impl PatternNode {
    fn is_empty(&self) -> bool {
        self.literals.is_empty() && self.single.is_none() && self.multi.is_none() && self.terminal.is_none()
    }
}

/// The result of matching a path against the tree.
pub(crate) struct PatternMatch<'tree, 'path> {
    pub(crate) handler: &'tree SharedHandler,
    /// One entry per single-wildcard segment, in path order.
    pub(crate) captures: Vec<&'path str>,
    /// The rest of the path matched by `**`, without its leading slash.
    pub(crate) tail: Option<&'path str>,
}

/// A per-method trie of path patterns.
#[derive(Default)]
pub(crate) struct PatternTree {
    root: PatternNode,
}

impl PatternTree {
    /// Inserts a handler, returning the previously registered one when the
    /// exact pattern was already present.
    pub(crate) fn insert(&mut self, segments: &[Segment], handler: SharedHandler) -> Option<SharedHandler> {
        let mut node = &mut self.root;
        for segment in segments {
            match segment {
                Segment::Literal(name) => {
                    node = node.literals.entry(name.clone()).or_default();
                }
                Segment::Single => {
                    node = node.single.get_or_insert_with(Box::default);
                }
                Segment::Multi => return node.multi.replace(handler),
            }
        }
        node.terminal.replace(handler)
    }

    /// Matches a request path. Literal beats single-wildcard beats
    /// multi-wildcard; among `**` candidates the deepest wins.
    pub(crate) fn find<'tree, 'path>(&'tree self, path: &'path str) -> Option<PatternMatch<'tree, 'path>> {
        let segments = split_path(path);
        let mut node = &self.root;
        let mut captures: Vec<(usize, &'path str)> = Vec::new();
        let mut best_multi: Option<(usize, &'tree SharedHandler)> = None;

        for (depth, segment) in segments.iter().enumerate() {
            if let Some(handler) = &node.multi {
                best_multi = Some((depth, handler));
            }
            if let Some(child) = node.literals.get(*segment) {
                node = child;
                continue;
            }
            if let Some(child) = &node.single {
                captures.push((depth, segment));
                node = child;
                continue;
            }
            return multi_fallback(path, &segments, captures, best_multi);
        }

        if let Some(handler) = &node.terminal {
            let captures = captures.into_iter().map(|(_, segment)| segment).collect();
            return Some(PatternMatch { handler, captures, tail: None });
        }
        if let Some(handler) = &node.multi {
            // `**` also matches zero trailing segments
            best_multi = Some((segments.len(), handler));
        }
        multi_fallback(path, &segments, captures, best_multi)
    }

    /// Removes the handler registered under the exact pattern, pruning
    /// branches that become empty.
    pub(crate) fn remove(&mut self, segments: &[Segment]) -> bool {
        remove_at(&mut self.root, segments)
    }

    /// Looks up the handler registered under the exact pattern, without
    /// matching.
    pub(crate) fn get(&self, segments: &[Segment]) -> Option<SharedHandler> {
        let mut node = &self.root;
        for segment in segments {
            match segment {
                Segment::Literal(name) => node = node.literals.get(name)?,
                Segment::Single => node = node.single.as_deref()?,
                Segment::Multi => return node.multi.clone(),
            }
        }
        node.terminal.clone()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

fn multi_fallback<'tree, 'path>(
    path: &'path str,
    segments: &[&'path str],
    captures: Vec<(usize, &'path str)>,
    best_multi: Option<(usize, &'tree SharedHandler)>,
) -> Option<PatternMatch<'tree, 'path>> {
    let (depth, handler) = best_multi?;
    let captures =
        captures.into_iter().filter(|(d, _)| *d < depth).map(|(_, segment)| segment).collect();
    let tail = if depth < segments.len() {
        // the trailing segments are contiguous in the original path
        let offset = segments[depth].as_ptr() as usize - path.as_ptr() as usize;
        &path[offset..]
    } else {
        ""
    };
    Some(PatternMatch { handler, captures, tail: Some(tail) })
}

fn remove_at(node: &mut PatternNode, segments: &[Segment]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return node.terminal.take().is_some();
    };
    match first {
        Segment::Multi => node.multi.take().is_some(),
        Segment::Literal(name) => {
            let Some(child) = node.literals.get_mut(name) else {
                return false;
            };
            let removed = remove_at(child, rest);
            if removed && child.is_empty() {
                node.literals.remove(name);
            }
            removed
        }
        Segment::Single => {
            let Some(child) = node.single.as_deref_mut() else {
                return false;
            };
            let removed = remove_at(child, rest);
            if removed && child.is_empty() {
                node.single = None;
            }
            removed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coral_http::handler::{HandlerError, Next};
    use coral_http::protocol::{Request, Response};

    struct Noop;

    #[async_trait]
    impl RequestHandler for Noop {
        async fn handle(
            &self,
            _request: &mut Request,
            _response: &mut Response,
            _next: Next<'_>,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn handler() -> SharedHandler {
        Arc::new(Noop)
    }

    fn tree_with(patterns: &[&str]) -> (PatternTree, Vec<SharedHandler>) {
        let mut tree = PatternTree::default();
        let mut handlers = Vec::new();
        for pattern in patterns {
            let h = handler();
            tree.insert(&parse_pattern(pattern).unwrap(), Arc::clone(&h));
            handlers.push(h);
        }
        (tree, handlers)
    }

    #[test]
    fn parse_rejects_misplaced_multi_wildcard() {
        assert!(matches!(
            parse_pattern("/static/**/js"),
            Err(RouteError::MultiWildcardNotLast { .. })
        ));
        assert!(matches!(parse_pattern("no-slash"), Err(RouteError::InvalidPattern { .. })));
        assert!(parse_pattern("/static/**").is_ok());
    }

    #[test]
    fn literal_beats_single_beats_multi() {
        // A: "/x/*", B: "/x/y", C: "/x/**"
        let (tree, handlers) = tree_with(&["/x/*", "/x/y", "/x/**"]);
        let (a, b, c) = (&handlers[0], &handlers[1], &handlers[2]);

        assert!(Arc::ptr_eq(tree.find("/x/y").unwrap().handler, b));
        assert!(Arc::ptr_eq(tree.find("/x/z").unwrap().handler, a));
        assert!(Arc::ptr_eq(tree.find("/x/y/z").unwrap().handler, c));
    }

    #[test]
    fn deepest_multi_wildcard_wins() {
        let (tree, handlers) = tree_with(&["/**", "/static/**"]);

        let found = tree.find("/static/js/app.js").unwrap();
        assert!(Arc::ptr_eq(found.handler, &handlers[1]));
        assert_eq!(found.tail, Some("js/app.js"));

        let found = tree.find("/other/file").unwrap();
        assert!(Arc::ptr_eq(found.handler, &handlers[0]));
        assert_eq!(found.tail, Some("other/file"));
    }

    #[test]
    fn multi_wildcard_matches_zero_segments() {
        let (tree, handlers) = tree_with(&["/static/**"]);
        let found = tree.find("/static").unwrap();
        assert!(Arc::ptr_eq(found.handler, &handlers[0]));
        assert_eq!(found.tail, Some(""));
    }

    #[test]
    fn single_wildcard_matches_exactly_one_segment() {
        let (tree, _) = tree_with(&["/api/v1/user/*"]);

        let found = tree.find("/api/v1/user/42").unwrap();
        assert_eq!(found.captures, vec!["42"]);

        assert!(tree.find("/api/v1/user/42/logs").is_none());
        assert!(tree.find("/api/v1/user").is_none());
    }

    #[test]
    fn middle_wildcards_capture_in_order() {
        let (tree, _) = tree_with(&["/api/*/user/*/logs"]);
        let found = tree.find("/api/v2/user/7/logs").unwrap();
        assert_eq!(found.captures, vec!["v2", "7"]);
    }

    #[test]
    fn trailing_empty_segment_is_significant() {
        let (tree, handlers) = tree_with(&["/x", "/x/"]);
        assert!(Arc::ptr_eq(tree.find("/x").unwrap().handler, &handlers[0]));
        assert!(Arc::ptr_eq(tree.find("/x/").unwrap().handler, &handlers[1]));
    }

    #[test]
    fn root_path_matches_root_pattern() {
        let (tree, handlers) = tree_with(&["/"]);
        assert!(Arc::ptr_eq(tree.find("/").unwrap().handler, &handlers[0]));
        assert!(tree.find("/x").is_none());
    }

    #[test]
    fn descent_does_not_backtrack() {
        // a literal branch that dead-ends is not retried via the wildcard
        let (tree, handlers) = tree_with(&["/x/y/z", "/x/*/w"]);
        assert!(tree.find("/x/y/w").is_none());
        assert!(Arc::ptr_eq(tree.find("/x/q/w").unwrap().handler, &handlers[1]));
    }

    #[test]
    fn insert_replaces_existing_pattern() {
        let mut tree = PatternTree::default();
        let first = handler();
        let second = handler();
        let segments = parse_pattern("/dup").unwrap();

        assert!(tree.insert(&segments, Arc::clone(&first)).is_none());
        let replaced = tree.insert(&segments, Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert!(Arc::ptr_eq(tree.find("/dup").unwrap().handler, &second));
    }

    #[test]
    fn remove_prunes_empty_branches() {
        let (mut tree, _) = tree_with(&["/a/b/c", "/a/b/d", "/s/**"]);

        assert!(tree.remove(&parse_pattern("/a/b/c").unwrap()));
        assert!(tree.find("/a/b/c").is_none());
        assert!(tree.find("/a/b/d").is_some());

        assert!(tree.remove(&parse_pattern("/a/b/d").unwrap()));
        assert!(tree.remove(&parse_pattern("/s/**").unwrap()));
        assert!(tree.is_empty());

        // removing again reports absence
        assert!(!tree.remove(&parse_pattern("/a/b/c").unwrap()));
    }

    #[test]
    fn exact_lookup_does_not_match() {
        let (tree, handlers) = tree_with(&["/u/*"]);
        let exact = tree.get(&parse_pattern("/u/*").unwrap()).unwrap();
        assert!(Arc::ptr_eq(&exact, &handlers[0]));
        assert!(tree.get(&parse_pattern("/u/42").unwrap()).is_none());
    }
}
