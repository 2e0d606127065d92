use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::StoreError;
use crate::model::GraphModel;

use super::Uri;

/// Upper bound on suffix retries in [`UriGenerator::generate_unique`].
pub const MAX_GENERATION_ATTEMPTS: u32 = 1000;

/// Derives canonical URIs from a base URI, a graph prefix and the
/// disambiguating segments of an instance.
///
/// Generated URIs have the shape `{base}{graph_prefix}/{seg_1}/.../{seg_n}`,
/// with `-{retry}` appended when `retry > 0`. The same inputs always produce
/// the same URI.
#[derive(Clone, Debug)]
pub struct UriGenerator {
    base: String,
}

impl UriGenerator {
    pub fn new(base: &Uri) -> Self {
        let mut base = base.as_str().to_string();
        if !base.ends_with('/') && !base.ends_with('#') {
            base.push('/');
        }
        UriGenerator { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// URI of the named graph (or collection, or table) holding a graph prefix.
    pub fn graph_uri(&self, graph_prefix: &str) -> Uri {
        Uri::from_trusted(format!("{}set/{}", self.base, normalize_segment(graph_prefix)))
    }

    /// Generate the URI of `model` without consulting any backend.
    pub fn generate<M: GraphModel>(&self, model: &M) -> Result<Uri, StoreError> {
        self.generate_with_retry(model, 0)
    }

    pub fn generate_with_retry<M: GraphModel>(
        &self,
        model: &M,
        retry: u32,
    ) -> Result<Uri, StoreError> {
        self.generate_from_segments(M::NAME, M::GRAPH_PREFIX, &model.uri_segments(), retry)
    }

    pub fn generate_from_segments(
        &self,
        class: &str,
        graph_prefix: &str,
        segments: &[Option<String>],
        retry: u32,
    ) -> Result<Uri, StoreError> {
        let prefix = normalize_segment(graph_prefix);
        if prefix.is_empty() {
            return Err(StoreError::ambiguous(class, "empty graph prefix"));
        }
        if segments.is_empty() {
            return Err(StoreError::ambiguous(class, "no disambiguating fields declared"));
        }

        let mut uri = format!("{}{}", self.base, prefix);
        for (position, segment) in segments.iter().enumerate() {
            let raw = segment.as_deref().ok_or_else(|| {
                StoreError::ambiguous(class, format!("identity segment {} is missing", position))
            })?;
            let normalized = normalize_segment(raw);
            if normalized.is_empty() {
                return Err(StoreError::ambiguous(
                    class,
                    format!("identity segment {} ({:?}) is empty after normalization", position, raw),
                ));
            }
            uri.push('/');
            uri.push_str(&normalized);
        }
        if retry > 0 {
            uri.push('-');
            uri.push_str(&retry.to_string());
        }

        Ok(Uri::from_trusted(uri))
    }

    /// Try `retry = 0, 1, 2, ...` until `exists` reports a free URI.
    pub fn generate_unique<M, F>(&self, model: &M, mut exists: F) -> Result<Uri, StoreError>
    where
        M: GraphModel,
        F: FnMut(&Uri) -> Result<bool, StoreError>,
    {
        for retry in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = self.generate_with_retry(model, retry)?;
            if !exists(&candidate)? {
                return Ok(candidate);
            }
        }
        Err(StoreError::ambiguous(
            M::NAME,
            format!("no free URI after {} attempts", MAX_GENERATION_ATTEMPTS),
        ))
    }
}

/// Lowercase and strip diacritics, then map everything that is neither
/// alphanumeric nor one of `._-` to `_`, collapse runs of `_` and strip them
/// from both ends. Letters without an ASCII base (`東`, `한`) are kept, so
/// names in other scripts stay distinct.
pub fn normalize_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let letters = raw
        .trim()
        .nfkd()
        .flat_map(char::to_lowercase)
        .filter(|ch| !is_combining_mark(*ch));
    for ch in letters {
        let mapped = if ch.is_alphanumeric() || matches!(ch, '.' | '-' | '_') {
            ch
        } else {
            '_'
        };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }
    // recompose what NFKD split apart without a mark (hangul syllables)
    out.trim_matches('_').nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> UriGenerator {
        UriGenerator::new(&Uri::parse("http://example.org").unwrap())
    }

    fn seg(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn base_gets_trailing_slash() {
        assert_eq!(generator().base(), "http://example.org/");
        let hash = UriGenerator::new(&Uri::parse("http://example.org/ns#").unwrap());
        assert_eq!(hash.base(), "http://example.org/ns#");
    }

    #[test]
    fn builds_prefix_and_segments() {
        let uri = generator()
            .generate_from_segments("plot", "plot", &[seg("Field A"), seg("Plot 1")], 0)
            .unwrap();
        assert_eq!(uri.as_str(), "http://example.org/plot/field_a/plot_1");
    }

    #[test]
    fn retry_appends_suffix() {
        let g = generator();
        let first = g.generate_from_segments("plot", "plot", &[seg("p")], 0).unwrap();
        let third = g.generate_from_segments("plot", "plot", &[seg("p")], 2).unwrap();
        assert_eq!(first.as_str(), "http://example.org/plot/p");
        assert_eq!(third.as_str(), "http://example.org/plot/p-2");
    }

    #[test]
    fn same_inputs_same_uri() {
        let g = generator();
        let a = g.generate_from_segments("plot", "plot", &[seg(" Plot 1 ")], 0).unwrap();
        let b = g.generate_from_segments("plot", "plot", &[seg("plot 1")], 0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_segment_is_ambiguous() {
        let err = generator()
            .generate_from_segments("plot", "plot", &[seg("a"), None], 0)
            .unwrap_err();
        assert!(matches!(err, StoreError::AmbiguousIdentity { .. }));
    }

    #[test]
    fn blank_segment_is_ambiguous() {
        let err = generator()
            .generate_from_segments("plot", "plot", &[seg("  !!  ")], 0)
            .unwrap_err();
        assert!(matches!(err, StoreError::AmbiguousIdentity { .. }));
    }

    #[test]
    fn no_segments_is_ambiguous() {
        let err = generator()
            .generate_from_segments("plot", "plot", &[], 0)
            .unwrap_err();
        assert!(matches!(err, StoreError::AmbiguousIdentity { .. }));
    }

    #[test]
    fn graph_uri_uses_set_segment() {
        assert_eq!(
            generator().graph_uri("Plot").as_str(),
            "http://example.org/set/plot"
        );
    }

    #[test]
    fn normalize_collapses_and_trims() {
        assert_eq!(normalize_segment("  Hello,  World!  "), "hello_world");
        assert_eq!(normalize_segment("a.b-c_d"), "a.b-c_d");
        assert_eq!(normalize_segment("___"), "");
    }

    #[test]
    fn normalize_strips_diacritics() {
        assert_eq!(normalize_segment("Été"), "ete");
        assert_eq!(normalize_segment("ôtô"), "oto");
        assert_eq!(normalize_segment("Crème Brûlée"), "creme_brulee");
        assert_eq!(normalize_segment("ﬁeld"), "field");
    }

    #[test]
    fn normalize_keeps_other_scripts() {
        assert_eq!(normalize_segment("東京 1"), "東京_1");
        assert_ne!(normalize_segment("東京 1"), normalize_segment("大阪 1"));
        assert_eq!(normalize_segment("한국"), "한국");
    }

    #[test]
    fn accented_homographs_get_distinct_uris() {
        let g = generator();
        let ete = g.generate_from_segments("plot", "plot", &[seg("Été")], 0).unwrap();
        let oto = g.generate_from_segments("plot", "plot", &[seg("ôtô")], 0).unwrap();
        assert_eq!(ete.as_str(), "http://example.org/plot/ete");
        assert_ne!(ete, oto);
    }
}
