//! Template recovery for low-cardinality metrics labels.

use super::matcher::Capture;
use super::route::Params;

/// Rebuild the route template a request matched from its literal path.
///
/// Each captured value is replaced by its `:name` placeholder, left to right,
/// in parameter order. Values only ever match whole segments, and a
/// multi-segment value (the repository path) collapses into one placeholder.
/// Without captured parameters the path is returned unchanged.
///
/// ```
/// use chart_server::router::{map_url_with_params_back_to_route_template, Params};
///
/// let params: Params = [("name", "foo"), ("version", "1.2.3")].into_iter().collect();
/// assert_eq!(
///     map_url_with_params_back_to_route_template("/api/charts/foo/1.2.3", &params),
///     "/api/charts/:name/:version"
/// );
/// ```
pub fn map_url_with_params_back_to_route_template(path: &str, params: &Params) -> String {
    if params.is_empty() {
        return path.to_string();
    }

    let mut segments: Vec<String> = path.split('/').map(str::to_string).collect();
    let mut cursor = 0;

    for (name, value) in params.iter() {
        if value.is_empty() {
            continue;
        }
        let needle: Vec<&str> = value.split('/').collect();
        let Some(start) = find_segments(&segments, cursor, &needle) else {
            continue;
        };
        segments.splice(
            start..start + needle.len(),
            std::iter::once(format!(":{name}")),
        );
        cursor = start + 1;
    }

    segments.join("/")
}

/// Rebuild the template from the positions the parameters were captured at.
///
/// Positions index the non-empty segments of `path`, as produced by
/// [`split_path`](super::split_path). Unlike the value search above this never
/// confuses a parameter with an equal literal elsewhere in the path.
pub fn substitute_captures(path: &str, captures: &[Capture]) -> String {
    if captures.is_empty() {
        return path.to_string();
    }

    let mut out = Vec::new();
    let mut segment = 0;
    let mut skip_until = 0;
    for piece in path.split('/') {
        if piece.is_empty() {
            if segment < skip_until {
                continue;
            }
            out.push(piece.to_string());
            continue;
        }
        let index = segment;
        segment += 1;
        if index < skip_until {
            continue;
        }
        match captures.iter().find(|c| c.start == index) {
            Some(capture) => {
                out.push(format!(":{}", capture.name));
                skip_until = index + capture.len;
            }
            None => out.push(piece.to_string()),
        }
    }
    out.join("/")
}

fn find_segments(haystack: &[String], from: usize, needle: &[&str]) -> Option<usize> {
    let last = haystack.len().checked_sub(needle.len())?;
    (from..=last).find(|&i| {
        haystack[i..i + needle.len()]
            .iter()
            .zip(needle)
            .all(|(have, want)| have == want)
    })
}
