use crate::audio::session::SessionManagerSummary;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();
    let sessions = state.sessions.summary();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "sessions": sessions.total_sessions
        },
        "memory": get_memory_info(),
        "reassembly": {
            "nominal_sample_rate": config.reassembly.nominal_sample_rate,
            "capacity_seconds": config.reassembly.capacity_seconds,
            "idle_timeout_ms": config.reassembly.idle_timeout_ms,
            "tick_interval_ms": config.reassembly.tick_interval_ms
        },
        "system": get_system_status(&sessions)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info(),
        "sessions": state.sessions.summary()
    }))
}

fn get_memory_info() -> serde_json::Value {
    match ProcessMemory::current() {
        Some(memory) => json!({
            "resident_memory_bytes": memory.resident_bytes,
            "virtual_memory_bytes": memory.virtual_bytes,
            "available": true
        }),
        None => json!({
            "resident_memory_bytes": 0,
            "virtual_memory_bytes": 0,
            "available": false,
            "note": "Memory info not available on this platform"
        }),
    }
}

/// Resident and virtual size of this process.
#[derive(Debug, Default, PartialEq, Eq)]
struct ProcessMemory {
    resident_bytes: u64,
    virtual_bytes: u64,
}

impl ProcessMemory {
    #[cfg(target_os = "linux")]
    fn current() -> Option<Self> {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .map(|status| Self::from_proc_status(&status))
    }

    #[cfg(not(target_os = "linux"))]
    fn current() -> Option<Self> {
        None
    }

    /// Reads the `VmRSS` and `VmSize` lines (reported in kB).
    fn from_proc_status(status: &str) -> Self {
        let kb_field = |line: &str, key: &str| {
            line.strip_prefix(key)
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|kb| kb.parse::<u64>().ok())
                .map(|kb| kb * 1024)
        };

        let mut memory = Self::default();
        for line in status.lines() {
            if let Some(bytes) = kb_field(line, "VmRSS:") {
                memory.resident_bytes = bytes;
            } else if let Some(bytes) = kb_field(line, "VmSize:") {
                memory.virtual_bytes = bytes;
            }
        }
        memory
    }
}

fn get_system_status(sessions: &SessionManagerSummary) -> serde_json::Value {
    let session_usage = if sessions.max_sessions > 0 {
        sessions.total_sessions as f64 / sessions.max_sessions as f64
    } else {
        0.0
    };

    let status = if session_usage > 0.9 {
        "high_load"
    } else if session_usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "session_usage_percent": (session_usage * 100.0).round(),
        "max_sessions": sessions.max_sessions,
        "current_sessions": sessions.total_sessions,
        "active_streams": sessions.status_counts.get("active").copied().unwrap_or(0),
        "load_warnings": if session_usage > 0.8 {
            vec!["High session usage - consider increasing max_concurrent_sessions"]
        } else {
            vec![]
        }
    })
}
