//! `/api/market`: quotes, watchlist and the live quote stream

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::auth::CurrentUser;
use crate::models::{StockPrice, TickerSubscription, WatchlistCreate, WatchlistItem};
use crate::store::NewWatchlistItem;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/quote/:ticker", get(get_quote))
        .route("/watchlist", get(list_watchlist).post(add_to_watchlist))
        .route("/watchlist/:id", delete(remove_from_watchlist))
        .route("/ws/stream/:user_id", get(stream_upgrade))
}

async fn get_quote(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(ticker): Path<String>,
) -> ApiResult<Json<StockPrice>> {
    let ticker = ticker.trim().to_uppercase();

    state
        .manager
        .get_quote(&ticker)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Quote not found for ticker: {}", ticker)))
}

async fn add_to_watchlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<WatchlistCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<WatchlistItem>)> {
    let Json(request) = payload?;
    request.validate()?;
    let ticker = request.normalized_ticker();

    if state
        .store
        .find_watchlist_ticker(user.id, &ticker)
        .await?
        .is_some()
    {
        return Err(ApiError::BadRequest("Ticker already in watchlist".to_string()));
    }

    let item = state
        .store
        .add_watchlist_item(NewWatchlistItem {
            user_id: user.id,
            ticker,
            company_name: request.company_name,
            notes: request.notes,
            alert_threshold: request.alert_threshold,
        })
        .await?;

    info!("User {} added {} to watchlist", user.username, item.ticker);

    Ok((StatusCode::CREATED, Json(item)))
}

async fn list_watchlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<WatchlistItem>>> {
    Ok(Json(state.store.list_watchlist(user.id).await?))
}

async fn remove_from_watchlist(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    item_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(item_id) = item_id?;
    let not_found = || ApiError::NotFound("Watchlist item not found".to_string());

    state
        .store
        .get_watchlist_item(user.id, item_id)
        .await?
        .ok_or_else(not_found)?;

    if !state.store.delete_watchlist_item(item_id).await? {
        return Err(not_found());
    }

    info!("User {} removed watchlist item {}", user.username, item_id);

    Ok(StatusCode::NO_CONTENT)
}

//
// ================= Quote stream =================
//

#[derive(Debug, Deserialize)]
struct StreamAuth {
    token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the bearer
/// token travels as `?token=` and must belong to the path's user.
async fn stream_upgrade(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(auth): Query<StreamAuth>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let authorized = auth
        .token
        .as_deref()
        .and_then(|token| state.jwt.validate_token(token).ok())
        .is_some_and(|claims| claims.sub == user_id);

    if !authorized {
        return ApiError::credentials().into_response();
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| stream_session(socket, state, user_id)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn stream_session(socket: WebSocket, state: AppState, user_id: String) {
    info!("WebSocket connected: user {}", user_id);

    let (mut sender, mut receiver) = socket.split();
    let mut prices = state.manager.price_feed();
    let mut feed_open = true;

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(&state, &user_id, &text).await;
                        if sender.send(Message::Text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error for user {}: {}", user_id, e);
                        break;
                    }
                }
            }

            price = prices.recv(), if feed_open => {
                match price {
                    Ok(price) => {
                        if !state.manager.subscriptions(&user_id).await.contains(&price.ticker) {
                            continue;
                        }
                        let mut data = price.snapshot_json();
                        data["ticker"] = json!(price.ticker);
                        let push = json!({ "action": "price", "data": data });
                        if sender.send(Message::Text(push.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Quote stream for user {} skipped {} prices", user_id, skipped);
                    }
                    Err(RecvError::Closed) => {
                        warn!("Price feed closed; user {} keeps request/reply only", user_id);
                        feed_open = false;
                    }
                }
            }
        }
    }

    info!("WebSocket disconnected: user {}", user_id);
    state.manager.unsubscribe_user(&user_id, None).await;
}

#[derive(Debug, Deserialize)]
struct ClientMessage {
    action: String,
    #[serde(default)]
    tickers: Option<Vec<String>>,
}

/// Reply to one client frame
async fn handle_client_message(state: &AppState, user_id: &str, text: &str) -> Value {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Malformed stream message from user {}: {}", user_id, e);
            return json!({ "status": "error", "detail": "Invalid message" });
        }
    };

    let tickers: Vec<String> = message
        .tickers
        .clone()
        .unwrap_or_default()
        .iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect();

    match message.action.as_str() {
        "subscribe" => {
            if let Err(e) = (TickerSubscription { tickers: tickers.clone() }).validate() {
                return json!({ "status": "error", "detail": e.to_string() });
            }
            state.manager.subscribe_user(user_id, &tickers).await;
            info!("User {} subscribed to {:?}", user_id, tickers);
            json!({ "status": "subscribed", "tickers": tickers })
        }
        "unsubscribe" => {
            let scope = message.tickers.as_ref().map(|_| tickers.as_slice());
            let removed = state.manager.unsubscribe_user(user_id, scope).await;
            info!("User {} unsubscribed from {:?}", user_id, removed);
            // an explicit list is echoed back as requested
            let echoed = if scope.is_some() { tickers } else { removed };
            json!({ "status": "unsubscribed", "tickers": echoed })
        }
        "get_quotes" => {
            let wanted = if tickers.is_empty() {
                state.manager.subscriptions(user_id).await
            } else {
                tickers
            };
            let quotes = state.orchestrator.market_snapshot(&wanted).await;
            json!({ "action": "quotes", "data": quotes })
        }
        other => json!({ "status": "error", "detail": format!("Unknown action: {}", other) }),
    }
}
