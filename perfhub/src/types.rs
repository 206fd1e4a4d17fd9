//! Types that mirror the agent's JSON schema.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub available_memory_gb: f64,
    pub total_processes: u32,
    pub system_uptime_sec: f64,
}

// Push channel envelope: {"event": "...", "data": ...}
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum HubMessage {
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: String },
    ReceivePerformanceData(Metrics),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Negotiated {
    pub connection_id: String,
    pub transport: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_frames() {
        let hello: HubMessage =
            serde_json::from_str(r#"{"event":"Connected","data":{"connectionId":"abc"}}"#)
                .unwrap();
        assert_eq!(
            hello,
            HubMessage::Connected {
                connection_id: "abc".into()
            }
        );

        let data: HubMessage = serde_json::from_str(
            r#"{"event":"ReceivePerformanceData","data":{"cpuUsage":12.5,"memoryUsage":40.0,
                "availableMemoryGb":7.25,"totalProcesses":301,"systemUptimeSec":9.0}}"#,
        )
        .unwrap();
        let HubMessage::ReceivePerformanceData(m) = data else {
            panic!("wrong variant");
        };
        assert_eq!(m.cpu_usage, 12.5);
        assert_eq!(m.total_processes, 301);
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(serde_json::from_str::<HubMessage>(r#"{"event":"Other","data":1}"#).is_err());
    }
}
