use std::sync::{Arc, Mutex};

use actix_cors::Cors;
use actix_web::{
    delete, get,
    http::header,
    post, put,
    web::{self, Data},
    App, HttpResponse, HttpServer, Responder,
};
use common::req::{CommandRequest, ErrorCode, ErrorResponse, MessageResponse};

use crate::config::PanelConfig;
use crate::db::{self, Db, NewListing, Status, StoreListing};
use crate::dispatch;
use crate::robot::SessionFactory;
use crate::status;
use crate::store::{self, InstallOutcome};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Db>>,
    pub factory: Arc<dyn SessionFactory>,
    pub cfg: Arc<PanelConfig>,
}

fn error_response(code: ErrorCode) -> HttpResponse {
    let body = ErrorResponse::new(code);
    match code {
        ErrorCode::DeviceBusy => HttpResponse::Conflict().json(body),
        ErrorCode::CommandNotFound => HttpResponse::BadRequest().json(body),
        _ => HttpResponse::BadGateway().json(body),
    }
}

fn message_response(message: impl Into<String>) -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse {
        message: message.into(),
    })
}

fn dispatch_response(result: Result<String, ErrorCode>) -> HttpResponse {
    match result {
        Ok(message) => message_response(message),
        Err(code) => error_response(code),
    }
}

fn internal_error(err: anyhow::Error) -> HttpResponse {
    log::error!("request failed: {err:#}");
    HttpResponse::InternalServerError().finish()
}

#[get("/")]
async fn hello() -> impl Responder {
    HttpResponse::Ok().body("robot panel backend")
}

#[derive(serde::Deserialize, Debug)]
struct StatusQuery {
    force: Option<bool>,
}

#[get("/api/status")]
async fn api_status(query: web::Query<StatusQuery>, state: Data<AppState>) -> impl Responder {
    let force = query.force.unwrap_or(false);
    if let Err(code) = status::refresh_status(&state.db, state.factory.as_ref(), &state.cfg, force)
    {
        return error_response(code);
    }
    match db::lock(&state.db).and_then(|mut guard| guard.status()) {
        Ok(row) => HttpResponse::Ok().json(row),
        Err(err) => internal_error(err),
    }
}

#[post("/api/commands")]
async fn api_enqueue_command(
    body: web::Json<CommandRequest>,
    state: Data<AppState>,
) -> impl Responder {
    match db::lock(&state.db).and_then(|mut guard| guard.enqueue_command(&body.command)) {
        Ok(()) => message_response(format!("Command added: {}", body.command)),
        Err(err) => internal_error(err),
    }
}

#[get("/api/commands")]
async fn api_pending_commands(state: Data<AppState>) -> impl Responder {
    match db::lock(&state.db).and_then(|mut guard| guard.pending_commands()) {
        Ok(rows) => HttpResponse::Ok().json(rows),
        Err(err) => internal_error(err),
    }
}

#[post("/api/execute")]
async fn api_execute(state: Data<AppState>) -> impl Responder {
    let queued = match db::lock(&state.db).and_then(|mut guard| guard.pending_commands()) {
        Ok(rows) => rows,
        Err(err) => return internal_error(err),
    };
    if queued.is_empty() {
        return message_response("No command staged!");
    }
    dispatch_response(dispatch::dispatch(
        &state.db,
        state.factory.as_ref(),
        &state.cfg,
        None,
    ))
}

#[post("/api/dock")]
async fn api_dock(state: Data<AppState>) -> impl Responder {
    dispatch_response(dispatch::dock(&state.db, state.factory.as_ref(), &state.cfg))
}

#[post("/api/undock")]
async fn api_undock(state: Data<AppState>) -> impl Responder {
    dispatch_response(dispatch::undock(
        &state.db,
        state.factory.as_ref(),
        &state.cfg,
    ))
}

#[post("/api/cube/connect")]
async fn api_connect_cube(state: Data<AppState>) -> impl Responder {
    dispatch_response(dispatch::connect_cube(
        &state.db,
        state.factory.as_ref(),
        &state.cfg,
    ))
}

#[post("/api/cube/pickup")]
async fn api_pickup_cube(state: Data<AppState>) -> impl Responder {
    dispatch_response(dispatch::pickup_cube(
        &state.db,
        state.factory.as_ref(),
        &state.cfg,
    ))
}

#[derive(serde::Deserialize, Debug)]
struct StoreQuery {
    search: Option<String>,
    by_name: Option<bool>,
    by_description: Option<bool>,
    by_author: Option<bool>,
}

#[derive(serde::Serialize)]
struct CatalogResponse {
    search_term: Option<String>,
    num_results: usize,
    status: Option<Status>,
    listings: Vec<StoreListing>,
}

#[get("/api/store")]
async fn api_store(query: web::Query<StoreQuery>, state: Data<AppState>) -> impl Responder {
    if let Err(err) = store::clear_temp_folder(&state.cfg) {
        log::warn!("could not reset the temp folder: {err:#}");
    }

    let loaded = db::lock(&state.db).and_then(|mut guard| {
        store::sync_installed_flags(&mut guard)?;
        let mut prefs = guard.settings()?;
        if query.by_name.is_some() || query.by_description.is_some() || query.by_author.is_some()
        {
            prefs.search_by_name = query.by_name.unwrap_or(prefs.search_by_name);
            prefs.search_by_description =
                query.by_description.unwrap_or(prefs.search_by_description);
            prefs.search_by_author = query.by_author.unwrap_or(prefs.search_by_author);
            guard.update_settings(&prefs)?;
        }
        Ok((guard.listings()?, prefs))
    });
    let (listings, prefs) = match loaded {
        Ok(loaded) => loaded,
        Err(err) => return internal_error(err),
    };

    if let Err(code) =
        status::refresh_status(&state.db, state.factory.as_ref(), &state.cfg, false)
    {
        return error_response(code);
    }
    let status_row = match db::lock(&state.db).and_then(|mut guard| guard.status()) {
        Ok(row) => row,
        Err(err) => return internal_error(err),
    };

    let (listings, num_results) = match query.search.as_deref() {
        Some(term) if !term.is_empty() => {
            let filtered = store::search_listings(&listings, &prefs, term);
            let count = filtered.len();
            (filtered, count)
        }
        _ => (listings, 0),
    };

    HttpResponse::Ok().json(CatalogResponse {
        search_term: query.search.clone(),
        num_results,
        status: status_row,
        listings,
    })
}

#[post("/api/store")]
async fn api_store_add(body: web::Json<NewListing>, state: Data<AppState>) -> impl Responder {
    let listing = body.into_inner();
    match db::lock(&state.db).and_then(|mut guard| guard.insert_listing(&listing)) {
        Ok(()) => message_response(format!("{} added to app store.", listing.script_name)),
        Err(err) => internal_error(err),
    }
}

#[put("/api/store/{id}")]
async fn api_store_edit(
    path: web::Path<i32>,
    body: web::Json<NewListing>,
    state: Data<AppState>,
) -> impl Responder {
    let listing_id = path.into_inner();
    let result = db::lock(&state.db).and_then(|mut guard| {
        if guard.listing(listing_id)?.is_none() {
            return Ok(false);
        }
        guard.update_listing(listing_id, &body)?;
        Ok(true)
    });
    match result {
        Ok(true) => message_response("App updated!"),
        Ok(false) => HttpResponse::NotFound().finish(),
        Err(err) => internal_error(err),
    }
}

#[delete("/api/store/{id}")]
async fn api_store_delete(path: web::Path<i32>, state: Data<AppState>) -> impl Responder {
    match db::lock(&state.db).and_then(|mut guard| guard.delete_listing(path.into_inner())) {
        Ok(()) => message_response("App removed from store."),
        Err(err) => internal_error(err),
    }
}

#[post("/api/store/{id}/install")]
async fn api_store_install(path: web::Path<i32>, state: Data<AppState>) -> impl Responder {
    match store::install_store_application(&state.db, &state.cfg, path.into_inner()) {
        Ok(InstallOutcome::Installed(name)) => message_response(format!("{name} installed!")),
        Ok(InstallOutcome::AlreadyInstalled(name)) => {
            HttpResponse::Conflict().json(MessageResponse {
                message: format!(
                    "Application named \"{name}\" already exists, please rename the existing application and try again."
                ),
            })
        }
        Err(err) => internal_error(err),
    }
}

#[get("/api/store/{id}/export")]
async fn api_store_export(path: web::Path<i32>, state: Data<AppState>) -> impl Responder {
    match store::export_package(&state.db, &state.cfg, path.into_inner()) {
        Ok(zip_path) => match std::fs::read(&zip_path) {
            Ok(bytes) => HttpResponse::Ok()
                .content_type("application/zip")
                .body(bytes),
            Err(err) => internal_error(err.into()),
        },
        Err(err) => internal_error(err),
    }
}

#[post("/api/upload_package")]
async fn api_upload_package(body: web::Bytes, state: Data<AppState>) -> impl Responder {
    if body.is_empty() {
        return HttpResponse::BadRequest().json(MessageResponse {
            message: "No Package Uploaded!".to_string(),
        });
    }
    match store::upload_package(&state.db, &state.cfg, &body) {
        Ok(name) => message_response(format!("{name} added to app store.")),
        Err(err) => {
            log::warn!("package upload rejected: {err:#}");
            HttpResponse::BadRequest().json(MessageResponse {
                message: "Invalid package archive!".to_string(),
            })
        }
    }
}

#[get("/api/applications")]
async fn api_applications(state: Data<AppState>) -> impl Responder {
    match db::lock(&state.db).and_then(|mut guard| guard.applications()) {
        Ok(rows) => HttpResponse::Ok().json(rows),
        Err(err) => internal_error(err),
    }
}

pub async fn new_http_server(state: AppState) -> std::io::Result<()> {
    let bind = state.cfg.bind.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .app_data(web::PayloadConfig::new(16 * 1024 * 1024))
            .service(hello)
            .service(api_status)
            .service(api_enqueue_command)
            .service(api_pending_commands)
            .service(api_execute)
            .service(api_dock)
            .service(api_undock)
            .service(api_connect_cube)
            .service(api_pickup_cube)
            .service(api_store)
            .service(api_store_add)
            .service(api_store_edit)
            .service(api_store_delete)
            .service(api_store_install)
            .service(api_store_export)
            .service(api_upload_package)
            .service(api_applications)
            .wrap(
                Cors::default()
                    .allowed_origin("http://127.0.0.1:8080") // frontend
                    .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
                    .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
                    .allowed_header(header::CONTENT_TYPE)
                    .supports_credentials()
                    .max_age(3600),
            )
    })
    .bind(bind)?
    .run()
    .await
}
