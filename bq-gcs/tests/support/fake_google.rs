#![allow(dead_code)]

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Mutex;

use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde_json::{Value, json};

/// Token minted by the fake metadata server.
pub const FAKE_TOKEN: &str = "fake-token";

/// Table id whose extract jobs finish with an error.
pub const MISSING_TABLE: &str = "missing";

/// Project whose job inserts are denied.
pub const FORBIDDEN_PROJECT: &str = "forbidden";

/// Token minted by the fake IAM Credentials API for impersonated principals.
pub const IMPERSONATED_TOKEN: &str = "impersonated-token";

/// Service account which may not be impersonated.
pub const DENIED_PRINCIPAL: &str = "denied@runner.iam.gserviceaccount.com";

/// `generateAccessToken` call observed by the fake.
#[derive(Debug, Clone)]
pub struct Impersonation {
    pub principal: String,
    pub authorization: String,
    pub request: Value,
}

/// Requests observed by the fake.
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub authorizations: Vec<String>,
    pub inserted_jobs: Vec<Value>,
    pub job_gets: usize,
    pub published: Vec<(String, Vec<u8>)>,
    pub secret_accesses: Vec<String>,
    pub impersonations: Vec<Impersonation>,
}

struct FakeState {
    recorded: Mutex<Recorded>,
    secrets: HashMap<String, String>,
}

impl FakeState {
    fn record_authorization(&self, req: &HttpRequest) {
        let authorization = req
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        self.recorded.lock().unwrap().authorizations.push(authorization);
    }
}

/// Local stand-in for the Google REST APIs used by the function.
pub struct FakeGoogle {
    pub address: String,
    state: web::Data<FakeState>,
}

impl FakeGoogle {
    pub fn recorded(&self) -> Recorded {
        self.state.recorded.lock().unwrap().clone()
    }
}

fn google_error(code: u16, status: &str, message: &str) -> Value {
    json!({ "error": { "code": code, "status": status, "message": message } })
}

async fn metadata_token(req: HttpRequest) -> HttpResponse {
    let flavor = req
        .headers()
        .get("metadata-flavor")
        .and_then(|value| value.to_str().ok());

    if flavor != Some("Google") {
        return HttpResponse::Forbidden().body("missing Metadata-Flavor header");
    }

    HttpResponse::Ok().json(json!({
        "access_token": FAKE_TOKEN,
        "expires_in": 3599,
        "token_type": "Bearer"
    }))
}

async fn generate_access_token(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<Value>,
    state: web::Data<FakeState>,
) -> HttpResponse {
    let Some((principal, "generateAccessToken")) = path.split_once(':') else {
        return HttpResponse::NotFound().finish();
    };

    let authorization = req
        .headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    state.recorded.lock().unwrap().impersonations.push(Impersonation {
        principal: principal.to_string(),
        authorization,
        request: body.into_inner(),
    });

    if principal == DENIED_PRINCIPAL {
        return HttpResponse::Forbidden().json(google_error(
            403,
            "PERMISSION_DENIED",
            "Permission 'iam.serviceAccounts.getAccessToken' denied",
        ));
    }

    HttpResponse::Ok().json(json!({
        "accessToken": IMPERSONATED_TOKEN,
        "expireTime": "2999-01-01T00:00:00Z"
    }))
}

async fn insert_job(
    req: HttpRequest,
    path: web::Path<String>,
    job: web::Json<Value>,
    state: web::Data<FakeState>,
) -> HttpResponse {
    state.record_authorization(&req);

    if path.into_inner() == FORBIDDEN_PROJECT {
        return HttpResponse::Forbidden().json(google_error(
            403,
            "PERMISSION_DENIED",
            "Access Denied: Project forbidden",
        ));
    }

    let mut job = job.into_inner();
    state.recorded.lock().unwrap().inserted_jobs.push(job.clone());
    job["status"] = json!({ "state": "RUNNING" });

    HttpResponse::Ok().json(job)
}

async fn get_job(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    state: web::Data<FakeState>,
) -> HttpResponse {
    state.record_authorization(&req);
    let (_, job_id) = path.into_inner();

    let job = {
        let mut recorded = state.recorded.lock().unwrap();
        recorded.job_gets += 1;
        recorded
            .inserted_jobs
            .iter()
            .find(|job| job["jobReference"]["jobId"] == job_id.as_str())
            .cloned()
    };

    let Some(mut job) = job else {
        return HttpResponse::NotFound().json(google_error(404, "NOT_FOUND", "Not found: Job"));
    };

    let table_id = job["configuration"]["extract"]["sourceTable"]["tableId"].clone();
    if table_id == MISSING_TABLE {
        job["status"] = json!({
            "state": "DONE",
            "errorResult": { "reason": "notFound", "message": "Not found: Table p:d.missing" }
        });
    } else {
        job["statistics"] = json!({
            "startTime": "1700000000000",
            "endTime": "1700000001000",
            "totalSlotMs": "77"
        });
        job["status"] = json!({ "state": "DONE" });
    }

    HttpResponse::Ok().json(job)
}

async fn publish(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    body: web::Json<Value>,
    state: web::Data<FakeState>,
) -> HttpResponse {
    state.record_authorization(&req);
    let (project, action) = path.into_inner();

    let Some((topic, "publish")) = action.split_once(':') else {
        return HttpResponse::NotFound().finish();
    };

    let data = body["messages"][0]["data"].as_str().unwrap_or_default();
    let data = BASE64_STANDARD.decode(data).unwrap_or_default();

    let mut recorded = state.recorded.lock().unwrap();
    recorded
        .published
        .push((format!("projects/{project}/topics/{topic}"), data));
    let message_id = format!("m-{}", recorded.published.len());

    HttpResponse::Ok().json(json!({ "messageIds": [message_id] }))
}

async fn access_secret(
    req: HttpRequest,
    path: web::Path<(String, String, String)>,
    state: web::Data<FakeState>,
) -> HttpResponse {
    state.record_authorization(&req);
    let (project, name, action) = path.into_inner();

    let Some((version, "access")) = action.split_once(':') else {
        return HttpResponse::NotFound().finish();
    };

    state
        .recorded
        .lock()
        .unwrap()
        .secret_accesses
        .push(format!("projects/{project}/secrets/{name}/versions/{version}"));

    match state.secrets.get(&name) {
        Some(value) => HttpResponse::Ok().json(json!({
            "name": format!("projects/{project}/secrets/{name}/versions/1"),
            "payload": { "data": BASE64_STANDARD.encode(value) }
        })),
        None => HttpResponse::NotFound().json(google_error(
            404,
            "NOT_FOUND",
            &format!("Secret [projects/{project}/secrets/{name}] not found or has no versions."),
        )),
    }
}

/// Starts the fake on a random local port, serving `secrets` by name.
pub async fn spawn_fake_google(secrets: &[(&str, &str)]) -> FakeGoogle {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let state = web::Data::new(FakeState {
        recorded: Mutex::new(Recorded::default()),
        secrets: secrets
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
    });

    let server_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_state.clone())
            .route(
                "/computeMetadata/v1/instance/service-accounts/default/token",
                web::get().to(metadata_token),
            )
            .route(
                "/iamcredentials/v1/projects/-/serviceAccounts/{action}",
                web::post().to(generate_access_token),
            )
            .route(
                "/bigquery/v2/projects/{project}/jobs",
                web::post().to(insert_job),
            )
            .route(
                "/bigquery/v2/projects/{project}/jobs/{job_id}",
                web::get().to(get_job),
            )
            .route(
                "/pubsub/v1/projects/{project}/topics/{action}",
                web::post().to(publish),
            )
            .route(
                "/secretmanager/v1/projects/{project}/secrets/{name}/versions/{action}",
                web::get().to(access_secret),
            )
    })
    .workers(1)
    .listen(listener)
    .expect("failed to listen")
    .run();
    tokio::spawn(server);

    FakeGoogle {
        address: format!("http://127.0.0.1:{port}"),
        state,
    }
}
