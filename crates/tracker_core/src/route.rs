use std::fmt;

use url::Url;

use crate::{OperationKind, SessionId};

const SEARCH_SEGMENT: &str = "search";
const UPLOADS_SEGMENT: &str = "uploads";
const OPERATIONS_SEGMENT: &str = "operations";

/// Navigable address of a session. The session id is the only state carried
/// across reloads; everything else is re-derived by resolving it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    kind: Option<OperationKind>,
    id: SessionId,
}

impl Route {
    pub fn new(kind: Option<OperationKind>, id: SessionId) -> Self {
        Self { kind, id }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn kind(&self) -> Option<OperationKind> {
        self.kind
    }

    /// Parses `/search/<id>`, `/uploads/<id>`, `/operations/<id>`, a bare id,
    /// or any of those with a `?session=<id>` query, absolute or relative.
    pub fn parse(raw: &str) -> Option<Route> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let base = Url::parse("http://localhost/").ok()?;
        let url = base.join(raw).ok()?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let kind = segments.first().and_then(|segment| kind_for_segment(segment));

        let query_id = url
            .query_pairs()
            .find(|(key, _)| key == "session" || key == "id")
            .and_then(|(_, value)| SessionId::new(value.into_owned()));
        if let Some(id) = query_id {
            return Some(Route { kind, id });
        }

        match segments.as_slice() {
            [only] if !is_collection_segment(only) => Some(Route {
                kind: None,
                id: SessionId::new(*only)?,
            }),
            [collection, id] if is_collection_segment(collection) => Some(Route {
                kind,
                id: SessionId::new(*id)?,
            }),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        let collection = match self.kind {
            Some(OperationKind::Search) => SEARCH_SEGMENT,
            Some(OperationKind::UploadJob) => UPLOADS_SEGMENT,
            None => OPERATIONS_SEGMENT,
        };
        format!("/{collection}/{}", self.id)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

fn kind_for_segment(segment: &str) -> Option<OperationKind> {
    match segment {
        SEARCH_SEGMENT => Some(OperationKind::Search),
        UPLOADS_SEGMENT | "upload-jobs" | "upload" => Some(OperationKind::UploadJob),
        _ => None,
    }
}

fn is_collection_segment(segment: &str) -> bool {
    segment == OPERATIONS_SEGMENT || kind_for_segment(segment).is_some()
}
