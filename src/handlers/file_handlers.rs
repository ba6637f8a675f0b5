//! HTTP handlers for the file hosting UI: listing page, multipart upload,
//! delete, and signed downloads.
//!
//! Workflow failures become a flash cookie plus a redirect back to `/`;
//! only signed-download rejections and unexpected defects surface as error
//! pages.

use crate::{
    errors::AppError,
    services::file_service::{DownloadError, FileService, UploadError, UploadPart},
};
use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header, HeaderValue},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use minijinja::{Environment, context};
use serde::Deserialize;
use std::{io, sync::OnceLock};
use tokio_util::io::ReaderStream;

const FLASH_COOKIE: &str = "flash";

static TEMPLATE_ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn template_env() -> &'static Environment<'static> {
    TEMPLATE_ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.add_template("index.html", include_str!("../../templates/index.html"))
            .expect("embedded index template is valid");
        env
    })
}

/// Set a flash message cookie, consumed by the next render of `/`.
fn flash(jar: CookieJar, message: &str) -> CookieJar {
    jar.add(
        Cookie::build((FLASH_COOKIE, urlencoding::encode(message).into_owned()))
            .path("/")
            .http_only(true),
    )
}

fn take_flash(jar: CookieJar) -> (CookieJar, Option<String>) {
    let message = jar
        .get(FLASH_COOKIE)
        .and_then(|c| urlencoding::decode(c.value()).ok())
        .map(|v| v.into_owned());
    if message.is_some() {
        (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), message)
    } else {
        (jar, None)
    }
}

/// GET `/` — render the listing with fresh signed URLs.
pub async fn index(
    State(service): State<FileService>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let files = service
        .list()
        .await
        .map_err(|err| AppError::internal(format!("listing files: {}", err)))?;

    let (jar, flash_message) = take_flash(jar);
    let html = template_env()
        .get_template("index.html")
        .and_then(|tmpl| tmpl.render(context! { files, flash => flash_message }))
        .map_err(|err| AppError::internal(format!("rendering index: {}", err)))?;

    Ok((jar, Html(html)))
}

/// POST `/upload` — accept one multipart file field and run the upload
/// workflow. Always redirects back to `/` with a flash message.
pub async fn upload(
    State(service): State<FileService>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<(CookieJar, Redirect), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        // Feed the field through chunk-by-chunk so the payload is never
        // buffered whole in the handler.
        let data = futures::stream::unfold(field, |mut field| async move {
            match field.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), field)),
                Ok(None) => None,
                Err(err) => Some((Err(io::Error::other(err)), field)),
            }
        });

        let message = match service
            .upload(Some(UploadPart {
                original_name,
                content_type,
                data,
            }))
            .await
        {
            Ok(record) => {
                tracing::info!(
                    "uploaded `{}` as `{}` ({} bytes)",
                    record.original_name,
                    record.stored_name,
                    record.size_bytes
                );
                "File successfully uploaded".to_string()
            }
            Err(err) => err.to_string(),
        };
        return Ok((flash(jar, &message), Redirect::to("/")));
    }

    // The request carried no file field at all.
    let message = UploadError::NoFilePart.to_string();
    Ok((flash(jar, &message), Redirect::to("/")))
}

/// POST `/delete/{id}` — run the delete workflow for one record.
pub async fn delete_file(
    State(service): State<FileService>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> (CookieJar, Redirect) {
    let message = match service.delete(id).await {
        Ok(()) => "File successfully deleted".to_string(),
        Err(err) => err.to_string(),
    };
    (flash(jar, &message), Redirect::to("/"))
}

/// Query half of a signed download URL.
#[derive(Debug, Deserialize)]
pub struct SignedLinkQuery {
    pub expires: i64,
    pub sig: String,
}

/// GET `/download/{key}` — verify the signature and stream the object.
pub async fn download(
    State(service): State<FileService>,
    Path(key): Path<String>,
    Query(query): Query<SignedLinkQuery>,
) -> Result<Response, AppError> {
    let (file, content_type, len) = service
        .open_signed(&key, query.expires, &query.sig)
        .await
        .map_err(|err| match err {
            DownloadError::Forbidden => AppError::forbidden(err.to_string()),
            DownloadError::NotFound => AppError::not_found(err.to_string()),
            DownloadError::Io(err) => AppError::internal(err.to_string()),
        })?;

    let body = Body::from_stream(ReaderStream::new(file));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&len.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", key)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
