//! Shared test fixture: an in-process fake Kubernetes API server, built the
//! way kube-rs supports mocking, as a `tower::Service` handed to
//! `kube::Client::new`. Good enough for API discovery and server-side apply.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use http::{Request, Response};
use kube::client::Body;
use serde_json::json;

/// Build a `kube::Client` backed by an in-process service, plus the list of
/// server-side-apply requests it received, recorded as `path?query`.
///
/// Discovery serves the core v1 group (configmaps, services, namespaces)
/// and the apps group (deployments). With `hide_apps_initially` the apps
/// group is omitted from the first `/apis` listing, so a cached discovery
/// from startup misses it and only a refresh can resolve it.
pub(crate) fn mock_apiserver(
    hide_apps_initially: bool,
) -> (kube::Client, Arc<Mutex<Vec<String>>>) {
    let patches: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let apis_listings = Arc::new(AtomicUsize::new(0));

    let recorded = patches.clone();
    let service = tower::service_fn(move |req: Request<Body>| {
        let patches = recorded.clone();
        let apis_listings = apis_listings.clone();
        async move {
            let path = req.uri().path().to_string();
            let query = req.uri().query().unwrap_or("").to_string();
            let method = req.method().clone();

            let (status, payload) = match (method.as_str(), path.as_str()) {
                ("GET", "/apis") => {
                    let listing = apis_listings.fetch_add(1, Ordering::SeqCst);
                    let groups = if hide_apps_initially && listing == 0 {
                        json!([])
                    } else {
                        json!([{
                            "name": "apps",
                            "versions": [{ "groupVersion": "apps/v1", "version": "v1" }],
                            "preferredVersion": { "groupVersion": "apps/v1", "version": "v1" }
                        }])
                    };
                    (
                        200,
                        json!({ "kind": "APIGroupList", "apiVersion": "v1", "groups": groups }),
                    )
                }
                ("GET", "/api") => (
                    200,
                    json!({
                        "kind": "APIVersions",
                        "versions": ["v1"],
                        "serverAddressByClientCIDRs": []
                    }),
                ),
                ("GET", "/api/v1") => (
                    200,
                    json!({
                        "kind": "APIResourceList",
                        "apiVersion": "v1",
                        "groupVersion": "v1",
                        "resources": [
                            {
                                "name": "configmaps",
                                "singularName": "configmap",
                                "namespaced": true,
                                "kind": "ConfigMap",
                                "verbs": ["create", "get", "list", "patch"]
                            },
                            {
                                "name": "services",
                                "singularName": "service",
                                "namespaced": true,
                                "kind": "Service",
                                "verbs": ["create", "get", "list", "patch"]
                            },
                            {
                                "name": "namespaces",
                                "singularName": "namespace",
                                "namespaced": false,
                                "kind": "Namespace",
                                "verbs": ["create", "get", "list", "patch"]
                            }
                        ]
                    }),
                ),
                ("GET", "/apis/apps/v1") => (
                    200,
                    json!({
                        "kind": "APIResourceList",
                        "apiVersion": "v1",
                        "groupVersion": "apps/v1",
                        "resources": [{
                            "name": "deployments",
                            "singularName": "deployment",
                            "namespaced": true,
                            "kind": "Deployment",
                            "verbs": ["create", "get", "list", "patch"]
                        }]
                    }),
                ),
                ("PATCH", _) => {
                    patches.lock().unwrap().push(format!("{path}?{query}"));
                    (
                        200,
                        json!({
                            "apiVersion": "v1",
                            "kind": "ConfigMap",
                            "metadata": { "name": "applied" }
                        }),
                    )
                }
                _ => (
                    404,
                    json!({
                        "kind": "Status",
                        "apiVersion": "v1",
                        "metadata": {},
                        "status": "Failure",
                        "reason": "NotFound",
                        "code": 404
                    }),
                ),
            };

            let response = Response::builder()
                .status(status)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&payload).unwrap()))
                .unwrap();
            Ok::<_, std::convert::Infallible>(response)
        }
    });

    (kube::Client::new(service, "default"), patches)
}
