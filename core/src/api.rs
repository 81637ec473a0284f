/// VigiHome REST client
///
/// Thin typed wrapper over the backend endpoints the live feeds and watchers consume.
/// Every call takes the session explicitly; nothing reads ambient credentials.
use crate::config::LiveConfig;
use crate::event::{Activity, ActivityRecord, Anomaly, AnomalyRecord, Origin};
use crate::session::{LoginRequest, LoginResponse, Session};
use crate::summary::{HealthStatusEntry, RealtimeMonitoring};
use crate::{Result, VigiError};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: &LiveConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(&config.user_agent)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ==========================================================================
    // Session
    // ==========================================================================

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        debug!(target: "session", email = %email, "Logging in");
        let request = self
            .http_client
            .post(self.url("/login"))
            .json(&LoginRequest { email, password });

        let response = self.send(request, None, "login").await.map_err(|e| match e {
            VigiError::Status { status: 401, .. } => {
                VigiError::Session("Invalid email or password".to_string())
            }
            other => other,
        })?;
        let login: LoginResponse = decode(response, "login").await?;
        let session = Session::from(login);
        info!(target: "session", email = %session.email, role = ?session.role, "Session opened");
        Ok(session)
    }

    /// Token lifecycle is owned by the backend; dropping the session is the whole logout
    pub fn logout(&self, session: Session) {
        info!(target: "session", email = %session.email, "Session closed");
        drop(session);
    }

    // ==========================================================================
    // Activities
    // ==========================================================================

    pub async fn manual_activities(
        &self,
        session: Option<&Session>,
        date: NaiveDate,
    ) -> Result<Vec<Activity>> {
        let records: Vec<ActivityRecord> = self
            .get_json(
                "/activities/manual",
                &[("target_date", date.format("%Y-%m-%d").to_string())],
                session,
                "manual activities",
            )
            .await?;
        into_activities(records, Origin::Manual)
    }

    pub async fn predicted_activities(
        &self,
        session: Option<&Session>,
        date: NaiveDate,
    ) -> Result<Vec<Activity>> {
        let records: Vec<ActivityRecord> = self
            .get_json(
                "/activities/predicted",
                &[("target_date", date.format("%Y-%m-%d").to_string())],
                session,
                "predicted activities",
            )
            .await?;
        into_activities(records, Origin::Predicted)
    }

    /// Activities of the logged-in dependent for one day
    pub async fn activities_by_date(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Vec<Activity>> {
        let records: Vec<ActivityRecord> = self
            .get_json(
                "/activities/by-date",
                &[("date", date.format("%Y-%m-%d").to_string())],
                Some(session),
                "activities by date",
            )
            .await?;
        into_activities(records, Origin::Manual)
    }

    // ==========================================================================
    // Anomalies
    // ==========================================================================

    pub async fn today_anomalies(&self, session: Option<&Session>) -> Result<Vec<Anomaly>> {
        let records: Vec<AnomalyRecord> = self
            .get_json("/anomalies/today", &[], session, "today anomalies")
            .await?;
        records.into_iter().map(AnomalyRecord::into_anomaly).collect()
    }

    pub async fn acknowledge_anomaly(&self, session: Option<&Session>, id: &str) -> Result<()> {
        let request = self
            .http_client
            .patch(self.url(&format!("/anomalies/{}/acknowledge", id)));
        self.send(request, session, "acknowledge anomaly").await?;
        info!(target: "api", anomaly_id = %id, "Anomaly acknowledged");
        Ok(())
    }

    // ==========================================================================
    // Summaries
    // ==========================================================================

    pub async fn realtime_monitoring(
        &self,
        session: Option<&Session>,
    ) -> Result<RealtimeMonitoring> {
        self.get_json("/monitoring/realtime", &[], session, "realtime monitoring")
            .await
    }

    /// Mood/health log of the caregiver's dependents, newest first
    pub async fn health_history(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Vec<HealthStatusEntry>> {
        self.get_json(
            "/health/history",
            &[("selected_date", date.format("%Y-%m-%d").to_string())],
            Some(session),
            "health history",
        )
        .await
    }

    // ==========================================================================
    // Plumbing
    // ==========================================================================

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        session: Option<&Session>,
        context: &str,
    ) -> Result<T> {
        let request = self.http_client.get(self.url(path)).query(query);
        let response = self.send(request, session, context).await?;
        decode(response, context).await
    }

    async fn send(
        &self,
        request: RequestBuilder,
        session: Option<&Session>,
        context: &str,
    ) -> Result<Response> {
        let request = match session {
            Some(session) => request.header(reqwest::header::AUTHORIZATION, session.bearer()),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            warn!(target: "api", context = %context, error = %e, "Request failed");
            VigiError::Transport(format!("{} request failed: {}", context, e))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED && session.is_some() {
            warn!(target: "api", context = %context, "Session rejected by backend");
            return Err(VigiError::Session(format!("{} rejected credentials", context)));
        }
        if !status.is_success() {
            warn!(target: "api", context = %context, status = %status, "Backend returned error");
            return Err(VigiError::Status {
                status: status.as_u16(),
                context: context.to_string(),
            });
        }
        Ok(response)
    }
}

/// Event endpoints the live feeds poll, bound to one session
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Manual and predicted activities of one day
    async fn activities(&self, date: NaiveDate) -> Result<Vec<Activity>>;

    /// Activities of the logged-in dependent for one day
    async fn dependent_activities(&self, date: NaiveDate) -> Result<Vec<Activity>>;

    async fn anomalies(&self, date: NaiveDate) -> Result<Vec<Anomaly>>;

    async fn acknowledge(&self, id: &str) -> Result<()>;
}

/// `EventSource` backed by the REST API
#[derive(Clone)]
pub struct BackendSource {
    api: ApiClient,
    session: Option<Session>,
}

impl BackendSource {
    pub fn new(api: ApiClient, session: Option<Session>) -> Self {
        Self { api, session }
    }

    fn require_session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| VigiError::Session("Login required".to_string()))
    }
}

#[async_trait]
impl EventSource for BackendSource {
    async fn activities(&self, date: NaiveDate) -> Result<Vec<Activity>> {
        let session = self.session.as_ref();
        let (mut manual, predicted) = tokio::try_join!(
            self.api.manual_activities(session, date),
            self.api.predicted_activities(session, date)
        )?;
        manual.extend(predicted);
        Ok(manual)
    }

    async fn dependent_activities(&self, date: NaiveDate) -> Result<Vec<Activity>> {
        let session = self.require_session()?;
        self.api.activities_by_date(session, date).await
    }

    /// The backend only serves the current day; other dates filter down to nothing
    async fn anomalies(&self, date: NaiveDate) -> Result<Vec<Anomaly>> {
        let today = self.api.today_anomalies(self.session.as_ref()).await?;
        Ok(today.into_iter().filter(|a| a.at.date() == date).collect())
    }

    async fn acknowledge(&self, id: &str) -> Result<()> {
        self.api.acknowledge_anomaly(self.session.as_ref(), id).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response, context: &str) -> Result<T> {
    response.json::<T>().await.map_err(|e| {
        warn!(target: "api", context = %context, error = %e, "Failed to parse response");
        VigiError::Decode(format!("Failed to parse {} response: {}", context, e))
    })
}

fn into_activities(records: Vec<ActivityRecord>, fallback: Origin) -> Result<Vec<Activity>> {
    records
        .into_iter()
        .map(|r| r.into_activity(fallback))
        .collect()
}
