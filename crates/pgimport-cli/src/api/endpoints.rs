//! API endpoint URL builders
//!
//! Every action goes through a single endpoint script, selected by the
//! `action` query parameter. An optional server identifier scopes requests to
//! one tenant of a multi-server installation.

/// Where requests are sent and how they are scoped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub base_url: String,
    /// Endpoint script path relative to `base_url`
    pub endpoint: String,
    /// Server/tenant identifier appended to every request
    pub server_id: Option<String>,
}

impl Route {
    pub fn new(base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: endpoint.into(),
            server_id: None,
        }
    }

    pub fn with_server_id(mut self, server_id: Option<String>) -> Self {
        self.server_id = server_id.filter(|id| !id.is_empty());
        self
    }
}

/// Build the URL for an action with extra query parameters
pub fn action_url(route: &Route, action: &str, params: &[(&str, &str)]) -> String {
    let mut url = format!(
        "{}/{}?action={}",
        route.base_url.trim_end_matches('/'),
        route.endpoint.trim_start_matches('/'),
        urlencoding::encode(action)
    );

    if let Some(ref server) = route.server_id {
        url.push_str(&format!("&server={}", urlencoding::encode(server)));
    }

    for (key, value) in params {
        url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
    }

    url
}

/// Build an action URL addressed to one job
pub fn job_url(route: &Route, action: &str, job_id: &str) -> String {
    action_url(route, action, &[("job_id", job_id)])
}

/// Build the raw chunk upload URL
pub fn chunk_url(route: &Route, job_id: &str, offset: u64) -> String {
    let offset = offset.to_string();
    action_url(
        route,
        "upload_chunk",
        &[("job_id", job_id), ("offset", &offset)],
    )
}

/// Build the job list URL
pub fn jobs_url(route: &Route, show_all: bool) -> String {
    if show_all {
        action_url(route, "list_jobs", &[("show_all", "1")])
    } else {
        action_url(route, "list_jobs", &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Route {
        Route::new("http://localhost:8080/", "dbimport.php")
    }

    #[test]
    fn test_action_url() {
        let url = action_url(&route(), "init_upload", &[]);
        assert_eq!(url, "http://localhost:8080/dbimport.php?action=init_upload");
    }

    #[test]
    fn test_server_scoping() {
        let scoped = route().with_server_id(Some("db1:5432:allow".to_string()));
        let url = job_url(&scoped, "status", "abc");
        assert_eq!(
            url,
            "http://localhost:8080/dbimport.php?action=status&server=db1%3A5432%3Aallow&job_id=abc"
        );

        let unscoped = route().with_server_id(Some(String::new()));
        assert_eq!(unscoped.server_id, None);
    }

    #[test]
    fn test_chunk_url() {
        let url = chunk_url(&route(), "job 7", 5_242_880);
        assert_eq!(
            url,
            "http://localhost:8080/dbimport.php?action=upload_chunk&job_id=job%207&offset=5242880"
        );
    }

    #[test]
    fn test_jobs_url() {
        assert!(jobs_url(&route(), true).ends_with("action=list_jobs&show_all=1"));
        assert!(jobs_url(&route(), false).ends_with("action=list_jobs"));
    }
}
