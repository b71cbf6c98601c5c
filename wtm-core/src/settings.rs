use serde::{Deserialize, Serialize};

/// Global monitor settings, stored next to the tanks in the settings
/// document. Every field has a default so a partial document loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub request_subscribe_mqtt_topic: String,
    pub data_publish_mqtt_topic: String,
    /// Seconds a station runs when it has no `minutes`.
    pub max_station_duration: u64,
    /// Seconds without a reading before a sensor is reported dead. Also the
    /// watchdog scan interval.
    pub max_sensor_no_signal_time: u64,

    pub dead_sensor_email: bool,
    pub dead_sensor_xmpp: bool,
    #[serde(rename = "dead_sensor_msg")]
    pub dead_sensor_template: String,

    pub unrecognised_msg_email: bool,
    pub unrecognised_msg_xmpp: bool,
    #[serde(rename = "unrecognised_msg")]
    pub unrecognised_template: String,

    pub unassociated_sensor_email: bool,
    pub unassociated_sensor_xmpp: bool,
    #[serde(rename = "xmpp_unassociated_sensor_msg")]
    pub unassociated_sensor_template: String,

    #[serde(rename = "xmpp_invalid_sensor_measurement_msg")]
    pub invalid_measurement_template: String,
    #[serde(rename = "xmpp_overflow_msg")]
    pub overflow_template: String,
    #[serde(rename = "xmpp_warning_msg")]
    pub warning_template: String,
    #[serde(rename = "xmpp_critical_msg")]
    pub critical_template: String,
    #[serde(rename = "water_loss_msg")]
    pub water_loss_template: String,
}

fn tank_template(headline: &str) -> String {
    format!(
        "{} water tank:'{{water_tank_id}}'/'{{water_tank_label}}', sensor_id:'{{sensor_id}}', \
         percentage: {{percentage}}%, measurement:'{{measurement}}', date:'{{last_updated}}', \
         mqtt topic:'{{mqtt_topic}}'. Additional info:[{{additional_info}}]",
        headline
    )
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            request_subscribe_mqtt_topic: "WaterTankDataRequest".to_string(),
            data_publish_mqtt_topic: "WaterTankData".to_string(),
            max_station_duration: 60,
            max_sensor_no_signal_time: 10,
            dead_sensor_email: true,
            dead_sensor_xmpp: true,
            dead_sensor_template: "Sensor '{sensor_id}' of water tank '{water_tank_label}' \
                ('water_tank_id: {water_tank_id}') may be dead. Last update was on '{last_updated}'. \
                Listening for sensor messages on MQTT topic:'{mqtt_topic}'."
                .to_string(),
            unrecognised_msg_email: true,
            unrecognised_msg_xmpp: true,
            unrecognised_template:
                "Unrecognised mqtt msg! MQTT topic:'{mqtt_topic}', date:'{date}', msg:[{message}]"
                    .to_string(),
            unassociated_sensor_email: true,
            unassociated_sensor_xmpp: true,
            unassociated_sensor_template: "Unassociated sensor measurement msg! sensor_id:'{sensor_id}', \
                measurement:'{measurement}', date:'{last_updated}', mqtt topic:'{mqtt_topic}'"
                .to_string(),
            invalid_measurement_template: tank_template("Invalid sensor measurement!"),
            overflow_template: tank_template("Overflow!"),
            warning_template: tank_template("Warning!"),
            critical_template: tank_template("Critical!"),
            water_loss_template: tank_template("Water loss!"),
        }
    }
}
