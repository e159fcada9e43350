mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use threadbook_api::{AppStateInner, VoiceBackend};
use threadbook_db::Database;
use threadbook_gateway::{
    CentrifugoPublisher, EventFanout, LiveKitRooms, LocalBroker, MediaRooms, Publisher, RoomSettings, TokenIssuer,
    TokenVerifier, VoiceGrants, connection,
};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threadbook=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);

    let transport = &config.centrifugo;
    let (publisher, transport_routes): (Arc<dyn Publisher>, Router) = match &transport.api_url {
        Some(url) => {
            info!("Publishing events to Centrifugo at {}", url);
            (Arc::new(CentrifugoPublisher::new(url, &transport.api_key)?), Router::new())
        }
        None => {
            warn!("CENTRIFUGO_API_URL not set, serving the in-process broker at /connection/websocket");
            let broker = LocalBroker::new(TokenVerifier::new(&transport.token_secret, transport.token_issuer.clone()));
            (Arc::new(broker.clone()), connection::routes(broker))
        }
    };
    let issuer = TokenIssuer::new(&transport.token_secret, transport.token_issuer.clone(), transport.token_ttl);

    let voice = match &config.livekit {
        Some(lk) => {
            let grants = VoiceGrants::new(lk.api_key.clone(), &lk.api_secret, lk.token_ttl);
            let settings = RoomSettings {
                empty_timeout_secs: lk.empty_room_ttl_secs,
                max_participants: lk.max_participants,
            };
            let rooms: Arc<dyn MediaRooms> = Arc::new(LiveKitRooms::new(&lk.url, grants.clone(), settings)?);
            info!("Voice rooms served by LiveKit at {}", lk.url);
            Some(VoiceBackend { rooms, grants })
        }
        None => {
            warn!("LIVEKIT_URL not set, voice tokens are unavailable");
            None
        }
    };

    let state = AppStateInner::new(db, EventFanout::new(publisher), issuer, voice, &config.session_secret);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let app = threadbook_api::router(state)
        .merge(transport_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("threadbook listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
