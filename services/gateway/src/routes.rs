//! HTTP surface
//!
//! ```text
//! POST   /gateway/v1/configurations                     provision
//! DELETE /gateway/v1/configurations/:id                 unprovision
//! POST   /gateway/v1/configurations/:id/handles         bind
//! DELETE /gateway/v1/configurations/:id/handles/:hid    unbind
//! *      /gateway/v1/configurations/:id/snapshots[/:s]  501
//! PUT    /gateway/v1/configurations/:id/serialized/*    501
//! GET    /gateway/v1/configurations/:id/jobs/:jid       501
//! POST   /service/internal/v1/restore
//! POST   /service/internal/v1/recover
//! POST   /service/internal/v1/check_orphan
//! DELETE /service/internal/v1/purge_orphan
//! POST   /service/internal/v1/migration/:node/:id/:action
//! GET    /service/internal/v1/migration/:node/instances
//! GET    /service/internal/v1/orphans
//! ```
//!
//! Every request passes admission in order: token, content type, handles
//! loaded. Failures surface as a [`ServiceError`] rejection and are rendered
//! by [`handle_rejection`] as `{code, description}` with the error's status.

use crate::config::TOKEN_HEADER;
use crate::gateway::Gateway;
use bytes::Bytes;
use codec::{
    CheckOrphanRequest, GatewayBindRequest, GatewayBindResponse, GatewayProvisionRequest,
    GatewayProvisionResponse, GatewayRecoverRequest, GatewayRestoreRequest, HandleList,
    InstanceListResponse, MigrationAction, PurgeOrphanHttpRequest, ServiceMessage,
};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info};
use types::{codes, ServiceError, ServiceResult};
use warp::http::header::CONTENT_TYPE;
use warp::http::{HeaderMap, StatusCode};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Service error carried through warp's rejection path
#[derive(Debug)]
struct ApiError(ServiceError);

impl warp::reject::Reject for ApiError {}

fn reject(err: ServiceError) -> Rejection {
    warp::reject::custom(ApiError(err))
}

trait OrReject<T> {
    fn or_reject(self) -> Result<T, Rejection>;
}

impl<T> OrReject<T> for ServiceResult<T> {
    fn or_reject(self) -> Result<T, Rejection> {
        self.map_err(reject)
    }
}

/// Full route table with structured error rendering
pub fn routes(
    gateway: Arc<Gateway>,
) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    public_routes(gateway.clone())
        .or(internal_routes(gateway))
        .unify()
        .recover(handle_rejection)
        .unify()
}

fn public_routes(
    gateway: Arc<Gateway>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let provision = warp::path!("gateway" / "v1" / "configurations")
        .and(warp::post())
        .and(with_gateway(gateway.clone()))
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(provision);

    let unprovision = warp::path!("gateway" / "v1" / "configurations" / String)
        .and(warp::delete())
        .and(with_gateway(gateway.clone()))
        .and(warp::header::headers_cloned())
        .and_then(unprovision);

    let bind = warp::path!("gateway" / "v1" / "configurations" / String / "handles")
        .and(warp::post())
        .and(with_gateway(gateway.clone()))
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(bind);

    let unbind = warp::path!("gateway" / "v1" / "configurations" / String / "handles" / String)
        .and(warp::delete())
        .and(with_gateway(gateway.clone()))
        .and(warp::header::headers_cloned())
        .and_then(unbind);

    let delegated = warp::path!("gateway" / "v1" / "configurations" / String / "snapshots")
        .map(|_: String| "snapshots")
        .or(warp::path!("gateway" / "v1" / "configurations" / String / "snapshots" / String)
            .map(|_: String, _: String| "snapshots"))
        .unify()
        .or(warp::path!("gateway" / "v1" / "configurations" / String / "serialized" / "url")
            .map(|_: String| "serialized"))
        .unify()
        .or(warp::path!("gateway" / "v1" / "configurations" / String / "serialized" / "data")
            .map(|_: String| "serialized"))
        .unify()
        .or(warp::path!("gateway" / "v1" / "configurations" / String / "jobs" / String)
            .map(|_: String, _: String| "jobs"))
        .unify()
        .and(with_gateway(gateway))
        .and(warp::header::headers_cloned())
        .and_then(not_implemented);

    provision
        .or(unprovision)
        .unify()
        .or(bind)
        .unify()
        .or(unbind)
        .unify()
        .or(delegated)
        .unify()
}

fn internal_routes(
    gateway: Arc<Gateway>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let restore = warp::path!("service" / "internal" / "v1" / "restore")
        .and(warp::post())
        .and(with_gateway(gateway.clone()))
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(restore);

    let recover = warp::path!("service" / "internal" / "v1" / "recover")
        .and(warp::post())
        .and(with_gateway(gateway.clone()))
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(recover);

    let check_orphan = warp::path!("service" / "internal" / "v1" / "check_orphan")
        .and(warp::post())
        .and(with_gateway(gateway.clone()))
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(check_orphan);

    let purge_orphan = warp::path!("service" / "internal" / "v1" / "purge_orphan")
        .and(warp::delete())
        .and(with_gateway(gateway.clone()))
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(purge_orphan);

    let migrate = warp::path!("service" / "internal" / "v1" / "migration" / String / String / String)
        .and(warp::post())
        .and(with_gateway(gateway.clone()))
        .and(warp::header::headers_cloned())
        .and_then(migrate);

    let instances = warp::path!("service" / "internal" / "v1" / "migration" / String / "instances")
        .and(warp::get())
        .and(with_gateway(gateway.clone()))
        .and(warp::header::headers_cloned())
        .and_then(instances);

    let orphans = warp::path!("service" / "internal" / "v1" / "orphans")
        .and(warp::get())
        .and(with_gateway(gateway))
        .and(warp::header::headers_cloned())
        .and_then(orphans);

    restore
        .or(recover)
        .unify()
        .or(check_orphan)
        .unify()
        .or(purge_orphan)
        .unify()
        .or(migrate)
        .unify()
        .or(instances)
        .unify()
        .or(orphans)
        .unify()
}

fn with_gateway(
    gateway: Arc<Gateway>,
) -> impl Filter<Extract = (Arc<Gateway>,), Error = Infallible> + Clone {
    warp::any().map(move || gateway.clone())
}

/// Token, then content type, then (optionally) the handle cache
fn admit(gateway: &Gateway, headers: &HeaderMap, needs_handles: bool) -> ServiceResult<()> {
    let token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    gateway.authorize(token)?;

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(ServiceError::new(codes::INVALID_CONTENT));
    }

    if needs_handles {
        gateway.ensure_handles_loaded()?;
    }
    Ok(())
}

fn decode<T: ServiceMessage>(body: &Bytes) -> ServiceResult<T> {
    Ok(T::decode(body)?)
}

fn ok<T: Serialize>(body: &T) -> Response {
    warp::reply::json(body).into_response()
}

fn empty() -> Response {
    ok(&json!({}))
}

async fn provision(gateway: Arc<Gateway>, headers: HeaderMap, body: Bytes) -> Result<Response, Rejection> {
    admit(&gateway, &headers, true).or_reject()?;
    let request: GatewayProvisionRequest = decode(&body).or_reject()?;
    gateway.check_label(&request.label).or_reject()?;

    let provisioner = gateway.provisioner().clone();
    let handle = gateway
        .execute("provision", async move {
            provisioner
                .provision_service(&request.plan, request.version.as_deref())
                .await
        })
        .await
        .or_reject()?;
    Ok(ok(&GatewayProvisionResponse::from(handle)))
}

async fn unprovision(instance_id: String, gateway: Arc<Gateway>, headers: HeaderMap) -> Result<Response, Rejection> {
    admit(&gateway, &headers, true).or_reject()?;

    let provisioner = gateway.provisioner().clone();
    gateway
        .execute("unprovision", async move { provisioner.unprovision_service(&instance_id).await })
        .await
        .or_reject()?;
    Ok(empty())
}

async fn bind(
    instance_id: String,
    gateway: Arc<Gateway>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Rejection> {
    admit(&gateway, &headers, true).or_reject()?;
    let request: GatewayBindRequest = decode(&body).or_reject()?;
    gateway.check_label(&request.label).or_reject()?;

    let provisioner = gateway.provisioner().clone();
    let handle = gateway
        .execute("bind", async move {
            provisioner
                .bind_instance(&instance_id, request.binding_options)
                .await
        })
        .await
        .or_reject()?;
    Ok(ok(&GatewayBindResponse::from(handle)))
}

async fn unbind(
    instance_id: String,
    handle_id: String,
    gateway: Arc<Gateway>,
    headers: HeaderMap,
) -> Result<Response, Rejection> {
    admit(&gateway, &headers, true).or_reject()?;

    let provisioner = gateway.provisioner().clone();
    gateway
        .execute("unbind", async move {
            provisioner.unbind_instance(&instance_id, &handle_id).await
        })
        .await
        .or_reject()?;
    Ok(empty())
}

async fn not_implemented(extension: &'static str, gateway: Arc<Gateway>, headers: HeaderMap) -> Result<Response, Rejection> {
    admit(&gateway, &headers, true).or_reject()?;
    debug!(extension, "Delegated endpoint not supported");
    Err(reject(ServiceError::not_implemented(extension)))
}

async fn restore(gateway: Arc<Gateway>, headers: HeaderMap, body: Bytes) -> Result<Response, Rejection> {
    admit(&gateway, &headers, true).or_reject()?;
    let request: GatewayRestoreRequest = decode(&body).or_reject()?;

    let provisioner = gateway.provisioner().clone();
    gateway
        .execute("restore", async move {
            provisioner
                .restore_instance(&request.instance_id, &request.backup_path)
                .await
        })
        .await
        .or_reject()?;
    Ok(empty())
}

async fn recover(gateway: Arc<Gateway>, headers: HeaderMap, body: Bytes) -> Result<Response, Rejection> {
    admit(&gateway, &headers, true).or_reject()?;
    let request: GatewayRecoverRequest = decode(&body).or_reject()?;

    let provisioner = gateway.provisioner().clone();
    let handles = gateway
        .execute("recover", async move {
            provisioner
                .recover_instance(&request.instance_id, &request.backup_path, &request.handles)
                .await
        })
        .await
        .or_reject()?;
    Ok(ok(&HandleList { handles }))
}

async fn check_orphan(gateway: Arc<Gateway>, headers: HeaderMap, body: Bytes) -> Result<Response, Rejection> {
    admit(&gateway, &headers, true).or_reject()?;
    let request = if body.is_empty() {
        CheckOrphanRequest::default()
    } else {
        decode::<CheckOrphanRequest>(&body).or_reject()?
    };

    gateway.check_orphan(request.handles).await.or_reject()?;
    Ok(empty())
}

async fn purge_orphan(gateway: Arc<Gateway>, headers: HeaderMap, body: Bytes) -> Result<Response, Rejection> {
    admit(&gateway, &headers, true).or_reject()?;
    let request: PurgeOrphanHttpRequest = decode(&body).or_reject()?;

    let provisioner = gateway.provisioner().clone();
    let published = gateway
        .execute("purge_orphan", async move {
            provisioner
                .purge_orphan(&request.orphan_instances, &request.orphan_bindings)
                .await
        })
        .await
        .or_reject()?;
    info!(published, "Orphan purge dispatched");
    Ok(empty())
}

async fn migrate(
    node_id: String,
    instance_id: String,
    action: String,
    gateway: Arc<Gateway>,
    headers: HeaderMap,
) -> Result<Response, Rejection> {
    admit(&gateway, &headers, true).or_reject()?;
    let action: MigrationAction = action.parse().or_reject()?;

    let provisioner = gateway.provisioner().clone();
    gateway
        .execute("migration", async move {
            provisioner
                .migrate_instance(&node_id, &instance_id, action)
                .await
        })
        .await
        .or_reject()?;
    Ok(empty())
}

async fn instances(node_id: String, gateway: Arc<Gateway>, headers: HeaderMap) -> Result<Response, Rejection> {
    admit(&gateway, &headers, true).or_reject()?;
    let instances = gateway.provisioner().get_instance_id_list(&node_id);
    Ok(ok(&InstanceListResponse { instances }))
}

async fn orphans(gateway: Arc<Gateway>, headers: HeaderMap) -> Result<Response, Rejection> {
    admit(&gateway, &headers, false).or_reject()?;
    Ok(ok(&gateway.provisioner().orphan_report()))
}

/// Render rejections as `{code, description}` bodies
pub async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let err = if let Some(ApiError(err)) = rejection.find::<ApiError>() {
        err.clone()
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        ServiceError::new(codes::METHOD_NOT_ALLOWED)
    } else if rejection.is_not_found() {
        ServiceError::not_found("Resource")
    } else {
        debug!(rejection = ?rejection, "Unhandled rejection");
        ServiceError::malformatted_request()
    };
    Ok(error_reply(&err))
}

fn error_reply(err: &ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warp::reply::with_status(warp::reply::json(&err.body()), status).into_response()
}
