//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into
//! a separate module. Keep this module neat and tidy 🙏
use actix::Addr;
use actix_web::{
    get,
    http::header,
    web,
    HttpResponse,
    Responder,
};
use log::*;
use order_stream_engine::{
    db_types::EventPayload,
    EventDatabase,
    EventFlowApi,
    OrderQueryApi,
};
use uuid::Uuid;

use crate::{
    broker::{EventBroker, PublishEvent},
    data_objects::OrdersQuery,
    errors::ServerError,
    session::{StreamSettings, SubscriberSession},
};

// Web-actix cannot handle generics in handlers, so routes are registered manually via the
// `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  -----------------------------------------------------------

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Ingress  ----------------------------------------------------------

route!(ingest_event => Post "/webhooks/payments/orders" impl EventDatabase);
/// Webhook ingress. Validates the body, runs admission, and on success hands the serialized
/// payload to the broker for fan-out.
pub async fn ingest_event<TEventDatabase>(
    body: web::Json<EventPayload>,
    api: web::Data<EventFlowApi<TEventDatabase>>,
    broker: web::Data<Addr<EventBroker>>,
) -> Result<HttpResponse, ServerError>
where
    TEventDatabase: EventDatabase + 'static,
{
    let payload = body.into_inner();
    trace!("📨️ Received webhook event {} for order {}", payload.event_id, payload.order_id);
    let event = payload.validate().map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    api.add_event(event, &payload.order_status).await?;
    let raw = serde_json::to_vec(&payload).map_err(|e| ServerError::BackendError(e.to_string()))?;
    broker.do_send(PublishEvent { payload: web::Bytes::from(raw) });
    debug!("📨️ Event {} accepted and published", payload.event_id);
    Ok(HttpResponse::Ok().finish())
}

// ----------------------------------------------   Stream   ----------------------------------------------------------

route!(stream_events => Get "/orders/{order_id}/events" impl EventDatabase);
/// Opens the SSE stream for an order: registers a subscriber session with the broker and streams
/// its gated output until disconnect or inactivity.
pub async fn stream_events<TEventDatabase>(
    path: web::Path<String>,
    api: web::Data<EventFlowApi<TEventDatabase>>,
    broker: web::Data<Addr<EventBroker>>,
    settings: web::Data<StreamSettings>,
) -> Result<HttpResponse, ServerError>
where
    TEventDatabase: EventDatabase + 'static,
{
    let order_id = Uuid::parse_str(&path.into_inner())
        .map_err(|e| ServerError::InvalidRequestBody(format!("malformed order id: {e}")))?;
    debug!("🛜️ New stream subscriber for order {order_id}");
    let stream =
        SubscriberSession::spawn(order_id, broker.get_ref().clone(), api.get_ref().clone(), *settings.get_ref());
    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .streaming(stream))
}

// ----------------------------------------------   Orders   ----------------------------------------------------------

route!(get_orders => Get "/orders" impl EventDatabase);
/// Filtered event query. A thin pass-through over the store.
pub async fn get_orders<TEventDatabase>(
    query: web::Query<OrdersQuery>,
    api: web::Data<OrderQueryApi<TEventDatabase>>,
) -> Result<HttpResponse, ServerError>
where
    TEventDatabase: EventDatabase + 'static,
{
    let filter = query.into_inner().into_filter()?;
    let events = api.search_orders(&filter).await?;
    debug!("🔍️ Orders query returned {} events", events.len());
    Ok(HttpResponse::Ok().json(events))
}
