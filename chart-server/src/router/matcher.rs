//! Path template compilation and segment matching.
//!
//! Templates are `/`-separated. A `:name` segment captures exactly one path
//! segment, except `:repo`, which captures the repository path: between 1 and
//! `depth` consecutive segments joined by `/`. At depth 0 the `:repo` segment
//! is dropped from the template entirely.

use percent_encoding::percent_decode_str;

use super::route::Params;

/// Name of the variadic repository-path parameter.
pub const REPO_PARAM: &str = "repo";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Repo,
}

/// A route template split into matchable segments.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    segments: Vec<Segment>,
    variadic: Option<usize>,
    literal_prefix: usize,
    depth: usize,
}

impl CompiledTemplate {
    pub fn compile(template: &str, depth: usize) -> Self {
        let mut segments = Vec::new();
        let mut variadic = None;

        for raw in template.split('/').filter(|s| !s.is_empty()) {
            match raw.strip_prefix(':') {
                Some(name) if name == REPO_PARAM && variadic.is_none() => {
                    if depth > 0 {
                        variadic = Some(segments.len());
                        segments.push(Segment::Repo);
                    }
                }
                Some(name) => segments.push(Segment::Param(name.to_string())),
                None => segments.push(Segment::Literal(raw.to_string())),
            }
        }

        let literal_prefix = segments
            .iter()
            .take_while(|s| matches!(s, Segment::Literal(_)))
            .count();

        Self {
            segments,
            variadic,
            literal_prefix,
            depth,
        }
    }

    /// Number of leading literal segments; the precedence key.
    pub fn literal_prefix(&self) -> usize {
        self.literal_prefix
    }

    /// Match already-split path segments, returning captured parameters.
    pub fn match_segments(&self, input: &[&str]) -> Option<Params> {
        self.match_with_positions(input).map(|(params, _)| params)
    }

    /// Like [`match_segments`](Self::match_segments), also reporting which
    /// input segments each parameter was captured from.
    pub fn match_with_positions(&self, input: &[&str]) -> Option<(Params, Vec<Capture>)> {
        let mut found = Captured::default();

        let Some(v) = self.variadic else {
            if input.len() != self.segments.len() {
                return None;
            }
            capture(&self.segments, input, 0, &mut found)?;
            return Some((found.params, found.positions));
        };

        let before = &self.segments[..v];
        let after = &self.segments[v + 1..];
        let fixed = before.len() + after.len();
        if input.len() <= fixed {
            return None;
        }
        let span = input.len() - fixed;
        if span > self.depth {
            return None;
        }

        capture(before, &input[..v], 0, &mut found)?;
        let repo: Vec<String> = input[v..v + span].iter().map(|s| decode(s)).collect();
        found.push(REPO_PARAM, repo.join("/"), v, span);
        capture(after, &input[v + span..], v + span, &mut found)?;
        Some((found.params, found.positions))
    }
}

/// Where one parameter sat in the split request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub name: String,
    /// Index of the first captured segment.
    pub start: usize,
    /// Number of segments captured.
    pub len: usize,
}

#[derive(Default)]
struct Captured {
    params: Params,
    positions: Vec<Capture>,
}

impl Captured {
    fn push(&mut self, name: &str, value: String, start: usize, len: usize) {
        self.params.push(name, value);
        self.positions.push(Capture {
            name: name.to_string(),
            start,
            len,
        });
    }
}

fn capture(
    segments: &[Segment],
    input: &[&str],
    offset: usize,
    found: &mut Captured,
) -> Option<()> {
    for (i, (segment, value)) in segments.iter().zip(input).enumerate() {
        match segment {
            Segment::Literal(literal) if literal == value => {}
            Segment::Literal(_) => return None,
            Segment::Param(name) => found.push(name, decode(value), offset + i, 1),
            Segment::Repo => found.push(REPO_PARAM, decode(value), offset + i, 1),
        }
    }
    Some(())
}

/// Percent-decode one captured path segment.
fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Split a request path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(template: &str, depth: usize, path: &str) -> Option<Params> {
        CompiledTemplate::compile(template, depth).match_segments(&split_path(path))
    }

    #[test]
    fn literal_templates_match_exactly() {
        assert_eq!(matches("/health", 0, "/health"), Some(Params::new()));
        assert_eq!(matches("/", 0, "/"), Some(Params::new()));
        assert!(matches("/health", 0, "/health/extra").is_none());
        assert!(matches("/health", 0, "/").is_none());
    }

    #[test]
    fn named_params_capture_one_segment() {
        let params = matches("/api/charts/:name/:version", 0, "/api/charts/foo/1.2.3").unwrap();
        assert_eq!(params.get("name"), Some("foo"));
        assert_eq!(params.get("version"), Some("1.2.3"));
        assert!(matches("/api/charts/:name/:version", 0, "/api/charts/foo").is_none());
    }

    #[test]
    fn repo_segment_spans_up_to_depth() {
        let params = matches("/:repo/whatsmyrepo", 3, "/x/y/z/whatsmyrepo").unwrap();
        assert_eq!(params.get(REPO_PARAM), Some("x/y/z"));

        let params = matches("/:repo/whatsmyrepo", 3, "/x/whatsmyrepo").unwrap();
        assert_eq!(params.get(REPO_PARAM), Some("x"));

        assert!(matches("/:repo/whatsmyrepo", 3, "/w/x/y/z/whatsmyrepo").is_none());
        assert!(matches("/:repo/whatsmyrepo", 3, "/whatsmyrepo").is_none());
    }

    #[test]
    fn repo_segment_with_params_on_both_sides() {
        let params = matches("/api/:repo/charts/:name/:version", 2, "/api/org/team/charts/foo/1.0.0")
            .unwrap();
        let captured: Vec<(&str, &str)> = params.iter().collect();
        assert_eq!(
            captured,
            vec![("repo", "org/team"), ("name", "foo"), ("version", "1.0.0")]
        );
    }

    #[test]
    fn depth_zero_drops_repo_segment() {
        let params = matches("/:repo/index.yaml", 0, "/index.yaml").unwrap();
        assert!(params.is_empty());
        assert!(matches("/:repo/index.yaml", 0, "/org/index.yaml").is_none());
    }

    #[test]
    fn literal_prefix_counts_leading_literals() {
        assert_eq!(CompiledTemplate::compile("/api/:repo/charts", 1).literal_prefix(), 1);
        assert_eq!(CompiledTemplate::compile("/:repo/index.yaml", 1).literal_prefix(), 0);
        assert_eq!(CompiledTemplate::compile("/:repo/index.yaml", 0).literal_prefix(), 1);
        assert_eq!(CompiledTemplate::compile("/health", 3).literal_prefix(), 1);
    }

    #[test]
    fn captured_values_are_percent_decoded() {
        let params = matches(
            "/api/:repo/charts/:name/:version",
            1,
            "/api/my%20repo/charts/foo/1.0.0%2Bbuild",
        )
        .unwrap();
        assert_eq!(params.get(REPO_PARAM), Some("my repo"));
        assert_eq!(params.get("version"), Some("1.0.0+build"));
    }

    #[test]
    fn positions_point_at_the_captured_segments() {
        let template = CompiledTemplate::compile("/api/:repo/charts/:name", 2);
        let (params, positions) = template
            .match_with_positions(&split_path("/api/api/charts/foo"))
            .unwrap();
        assert_eq!(params.get(REPO_PARAM), Some("api"));
        assert_eq!(
            positions,
            vec![
                Capture { name: "repo".to_string(), start: 1, len: 1 },
                Capture { name: "name".to_string(), start: 3, len: 1 },
            ]
        );

        let (_, positions) = template
            .match_with_positions(&split_path("/api/org/team/charts/foo"))
            .unwrap();
        assert_eq!(positions[0], Capture { name: "repo".to_string(), start: 1, len: 2 });
        assert_eq!(positions[1].start, 4);
    }
}
