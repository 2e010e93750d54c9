//! HTTP control surface. A UI pulls status and frames from here and pushes
//! commands and alignment requests.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::http::header::ContentType;
use actix_web::{web, App, HttpResponse, HttpServer};
use serde::Serialize;

use crate::command::Command;
use crate::error::TelloError;
use crate::session::Session;

pub struct AppState {
    pub session: Arc<Session>,
}

#[derive(Serialize)]
struct AlignReply {
    aligning: bool,
    changed: bool,
}

fn error_response(err: &TelloError) -> HttpResponse {
    match err {
        TelloError::UnknownCommand(_) => HttpResponse::BadRequest().body(err.to_string()),
        TelloError::ShutDown | TelloError::Closed(_) => {
            HttpResponse::ServiceUnavailable().body(err.to_string())
        }
        _ => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

async fn get_status(app_data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(app_data.session.status().await)
}

async fn get_telemetry(app_data: web::Data<AppState>) -> HttpResponse {
    match app_data.session.telemetry() {
        Some(telemetry) => HttpResponse::Ok().json(telemetry),
        None => HttpResponse::NoContent().finish(),
    }
}

async fn get_detection(app_data: web::Data<AppState>) -> HttpResponse {
    match app_data.session.latest_detection() {
        Some(detection) => HttpResponse::Ok().json(detection),
        None => HttpResponse::NoContent().finish(),
    }
}

async fn get_frame(app_data: web::Data<AppState>) -> HttpResponse {
    let Some(frame) = app_data.session.latest_frame() else {
        return HttpResponse::NoContent().finish();
    };
    match frame.encode_png() {
        Ok(png) => HttpResponse::Ok().content_type(ContentType::png()).body(png),
        Err(err) => error_response(&err),
    }
}

async fn post_command(body: String, app_data: web::Data<AppState>) -> HttpResponse {
    let command = match body.parse::<Command>() {
        Ok(command) => command,
        Err(err) => return error_response(&err),
    };
    match app_data.session.channel().send(command).await {
        Ok(()) => HttpResponse::Ok()
            .insert_header(ContentType::plaintext())
            .body(command.to_string()),
        Err(err) => error_response(&err),
    }
}

async fn post_align(app_data: web::Data<AppState>) -> HttpResponse {
    match app_data.session.engage_alignment().await {
        Ok(changed) => HttpResponse::Ok().json(AlignReply {
            aligning: true,
            changed,
        }),
        Err(err) => error_response(&err),
    }
}

async fn delete_align(app_data: web::Data<AppState>) -> HttpResponse {
    let changed = app_data.session.disengage_alignment().await;
    HttpResponse::Ok().json(AlignReply {
        aligning: false,
        changed,
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/status", web::get().to(get_status))
        .route("/telemetry", web::get().to(get_telemetry))
        .route("/detection", web::get().to(get_detection))
        .route("/frame", web::get().to(get_frame))
        .route("/command", web::post().to(post_command))
        .route("/align", web::post().to(post_align))
        .route("/align", web::delete().to(delete_align));
}

/// Serve until the server is stopped (ctrl-c).
pub async fn serve(session: Arc<Session>, bind: SocketAddr) -> io::Result<()> {
    let shared = web::Data::new(AppState { session });

    HttpServer::new(move || App::new().app_data(shared.clone()).configure(configure))
        .bind(bind)?
        .run()
        .await
}
