//! Templated operator messages and the alarm subscriber that sends them.

use crate::observer::{PercentageChangeObserver, StateChangeObserver};
use crate::scheduler::Scheduler;
use crate::settings::Settings;
use crate::tank::{display_or_empty, Level, Tank};
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use std::sync::Arc;
use wtm_utils::dates::format_timestamp;

/// Outbound message transport. Delivery is best effort.
pub trait Notifier: Send + Sync {
    fn send_email(&self, body: &str, subject_suffix: &str) -> anyhow::Result<()>;
    fn send_xmpp(&self, body: &str) -> anyhow::Result<()>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_email(&self, body: &str, subject_suffix: &str) -> anyhow::Result<()> {
        info!("[email] {}: {}", subject_suffix, body);
        Ok(())
    }

    fn send_xmpp(&self, body: &str) -> anyhow::Result<()> {
        info!("[xmpp] {}", body);
        Ok(())
    }
}

/// Replace every `{name}` placeholder with its value. Unknown placeholders
/// are left as they are.
pub fn render(template: &str, values: &[(&str, String)]) -> String {
    values.iter().fold(template.to_string(), |text, (name, value)| {
        text.replace(&format!("{{{}}}", name), value)
    })
}

fn tank_values(tank: &Tank, mqtt_topic: Option<&str>) -> Vec<(&'static str, String)> {
    vec![
        ("water_tank_id", tank.id.clone()),
        ("water_tank_label", tank.label.clone()),
        ("sensor_id", tank.sensor_id.clone().unwrap_or_default()),
        ("percentage", display_or_empty(tank.percentage)),
        ("measurement", display_or_empty(tank.sensor_measurement)),
        (
            "last_updated",
            tank.last_updated.as_ref().map(format_timestamp).unwrap_or_default(),
        ),
        ("mqtt_topic", mqtt_topic.unwrap_or_default().to_string()),
        ("additional_info", tank.additional_info()),
    ]
}

/// Builds messages from the configured templates and hands them to a
/// [`Notifier`] on the enabled channels.
#[derive(Clone)]
pub struct MessageDispatcher {
    notifier: Arc<dyn Notifier>,
    settings: Settings,
}

impl MessageDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, settings: Settings) -> Self {
        MessageDispatcher { notifier, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Both channels are attempted; the first failure is returned.
    fn send(&self, body: &str, subject: &str, email: bool, xmpp: bool) -> anyhow::Result<()> {
        let mut result = Ok(());
        if xmpp {
            if let Err(e) = self.notifier.send_xmpp(body) {
                warn!("Failed to send xmpp message '{}': {:#}", subject, e);
                result = Err(e);
            }
        }
        if email {
            if let Err(e) = self.notifier.send_email(body, subject) {
                warn!("Failed to send email '{}': {:#}", subject, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    pub fn level_alarm(&self, tank: &Tank, level: Level) -> anyhow::Result<()> {
        let (email, xmpp) = tank.alarm_channels(level);
        if !email && !xmpp {
            return Ok(());
        }
        let (template, subject) = match level {
            Level::Overflow => (&self.settings.overflow_template, "Overflow"),
            Level::Warning => (&self.settings.warning_template, "Warning"),
            Level::Critical => (&self.settings.critical_template, "Critical"),
        };
        info!("Sending {} message for water tank {}", level.name(), tank.id);
        let body = render(template, &tank_values(tank, tank.sensor_mqtt_topic.as_deref()));
        self.send(&body, subject, email, xmpp)
    }

    pub fn water_loss(&self, tank: &Tank) -> anyhow::Result<()> {
        if !tank.loss_email && !tank.loss_xmpp {
            return Ok(());
        }
        info!("Sending water loss message for water tank {}", tank.id);
        let body = render(
            &self.settings.water_loss_template,
            &tank_values(tank, tank.sensor_mqtt_topic.as_deref()),
        );
        self.send(&body, "Water Loss", tank.loss_email, tank.loss_xmpp)
    }

    pub fn invalid_measurement(&self, tank: &Tank) -> anyhow::Result<()> {
        let (email, xmpp) = (
            tank.invalid_sensor_measurement_email,
            tank.invalid_sensor_measurement_xmpp,
        );
        if !email && !xmpp {
            return Ok(());
        }
        let body = render(
            &self.settings.invalid_measurement_template,
            &tank_values(tank, tank.sensor_mqtt_topic.as_deref()),
        );
        self.send(&body, "Invalid measurement", email, xmpp)
    }

    pub fn dead_sensor(&self, tank: &Tank) -> anyhow::Result<()> {
        let (email, xmpp) = (self.settings.dead_sensor_email, self.settings.dead_sensor_xmpp);
        if !email && !xmpp {
            return Ok(());
        }
        let body = render(
            &self.settings.dead_sensor_template,
            &tank_values(tank, tank.sensor_mqtt_topic.as_deref()),
        );
        self.send(&body, "Dead Sensor", email, xmpp)
    }

    pub fn unrecognised_message(
        &self,
        mqtt_topic: &str,
        date: NaiveDateTime,
        message: &str,
    ) -> anyhow::Result<()> {
        let (email, xmpp) = (
            self.settings.unrecognised_msg_email,
            self.settings.unrecognised_msg_xmpp,
        );
        if !email && !xmpp {
            return Ok(());
        }
        let body = render(
            &self.settings.unrecognised_template,
            &[
                ("mqtt_topic", mqtt_topic.to_string()),
                ("date", format_timestamp(&date)),
                ("message", message.to_string()),
            ],
        );
        self.send(&body, "Unrecognised MQTT message!", email, xmpp)
    }

    pub fn unassociated_sensor(
        &self,
        sensor_id: &str,
        measurement: f64,
        date: NaiveDateTime,
        mqtt_topic: &str,
    ) -> anyhow::Result<()> {
        let (email, xmpp) = (
            self.settings.unassociated_sensor_email,
            self.settings.unassociated_sensor_xmpp,
        );
        if !email && !xmpp {
            return Ok(());
        }
        let body = render(
            &self.settings.unassociated_sensor_template,
            &[
                ("sensor_id", sensor_id.to_string()),
                ("measurement", measurement.to_string()),
                ("last_updated", format_timestamp(&date)),
                ("mqtt_topic", mqtt_topic.to_string()),
            ],
        );
        self.send(&body, "Unassociated sensor", email, xmpp)
    }
}

/// Tank subscriber sending alarm and water-loss messages.
///
/// Alarm messages go out when a tank enters OVERFLOW, WARNING or CRITICAL.
/// Water loss is a percentage drop while no station is open.
pub struct AlarmNotifier {
    messages: MessageDispatcher,
    scheduler: Arc<dyn Scheduler>,
}

impl AlarmNotifier {
    pub fn new(messages: MessageDispatcher, scheduler: Arc<dyn Scheduler>) -> Self {
        AlarmNotifier {
            messages,
            scheduler,
        }
    }
}

impl StateChangeObserver for AlarmNotifier {
    fn state_changed(&self, tank: &Tank) -> anyhow::Result<()> {
        match tank.state {
            Some(state) if state.is_base() => match state.level() {
                Some(level) => self.messages.level_alarm(tank, level),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

impl PercentageChangeObserver for AlarmNotifier {
    fn percentage_changed(&self, tank: &Tank, previous: Option<u8>) -> anyhow::Result<()> {
        let (Some(previous), Some(current)) = (previous, tank.percentage) else {
            return Ok(());
        };
        if previous > current && !self.scheduler.any_station_open() {
            debug!(
                "Water tank {} dropped from {}% to {}% with no station open",
                tank.id, previous, current
            );
            return self.messages.water_loss(tank);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tank::TankState;
    use crate::testing::{at, rectangular_tank, FakeScheduler, RecordingNotifier, Sent};

    fn dispatcher(notifier: &Arc<RecordingNotifier>) -> MessageDispatcher {
        MessageDispatcher::new(notifier.clone(), Settings::default())
    }

    #[test]
    fn test_render_replaces_known_placeholders() {
        let text = render(
            "{a} and {b} but not {c}",
            &[("a", "1".to_string()), ("b", "two".to_string())],
        );
        assert_eq!(text, "1 and two but not {c}");
    }

    #[test]
    fn test_overflow_message_body() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut tank = rectangular_tank("t1", 2.0);
        tank.overflow_email = true;
        tank.percentage = Some(91);
        tank.sensor_measurement = Some(0.18);
        tank.last_updated = Some(at(10, 0, 0));
        tank.state = Some(TankState::Overflow);

        dispatcher(&notifier).level_alarm(&tank, Level::Overflow).unwrap();
        assert_eq!(
            notifier.sent(),
            vec![Sent::Email {
                body: "Overflow! water tank:'t1'/'Tank t1', sensor_id:'sensor-t1', percentage: 91%, \
                       measurement:'0.18', date:'2024-05-01 10:00:00', mqtt topic:'sensors/level'. \
                       Additional info:[type: RECTANGULAR, min_valid_sensor_measurement: '', \
                       max_valid_sensor_measurement: '']"
                    .to_string(),
                subject: "Overflow".to_string(),
            }]
        );
    }

    #[test]
    fn test_disabled_channels_send_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let tank = rectangular_tank("t1", 2.0);
        let messages = dispatcher(&notifier);
        messages.level_alarm(&tank, Level::Critical).unwrap();
        messages.water_loss(&tank).unwrap();
        messages.invalid_measurement(&tank).unwrap();
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn test_failure_on_one_channel_still_tries_the_other() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let tank = rectangular_tank("t1", 2.0);
        let result = dispatcher(&notifier).dead_sensor(&tank);
        assert!(result.is_err());
        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(notifier.subjects(), vec!["Dead Sensor"]);
    }

    #[test]
    fn test_unrecognised_and_unassociated_messages() {
        let notifier = Arc::new(RecordingNotifier::default());
        let messages = dispatcher(&notifier);
        messages
            .unrecognised_message("sensors/level", at(8, 30, 0), "garbage")
            .unwrap();
        messages
            .unassociated_sensor("s9", 1.25, at(8, 31, 0), "sensors/level")
            .unwrap();
        let sent = notifier.sent();
        assert_eq!(
            sent[0],
            Sent::Xmpp {
                body: "Unrecognised mqtt msg! MQTT topic:'sensors/level', date:'2024-05-01 08:30:00', msg:[garbage]"
                    .to_string()
            }
        );
        assert_eq!(
            notifier.subjects(),
            vec!["Unrecognised MQTT message!", "Unassociated sensor"]
        );
        assert!(matches!(&sent[2], Sent::Xmpp { body } if body.contains("sensor_id:'s9', measurement:'1.25'")));
    }

    #[test]
    fn test_alarm_notifier_ignores_unsafe_and_normal_states() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler: Arc<dyn Scheduler> = Arc::new(FakeScheduler::default());
        let alarm = AlarmNotifier::new(dispatcher(&notifier), scheduler);
        let mut tank = rectangular_tank("t1", 2.0);
        tank.warning_xmpp = true;

        tank.state = Some(TankState::WarningUnsafe);
        alarm.state_changed(&tank).unwrap();
        tank.state = Some(TankState::Normal);
        alarm.state_changed(&tank).unwrap();
        assert!(notifier.sent().is_empty());

        tank.state = Some(TankState::Warning);
        alarm.state_changed(&tank).unwrap();
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn test_water_loss_only_when_dropping_with_stations_closed() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = Arc::new(FakeScheduler::default());
        let alarm = AlarmNotifier::new(dispatcher(&notifier), scheduler.clone());
        let mut tank = rectangular_tank("t1", 2.0);
        tank.loss_email = true;
        tank.percentage = Some(50);

        alarm.percentage_changed(&tank, Some(50)).unwrap();
        alarm.percentage_changed(&tank, Some(40)).unwrap();
        alarm.percentage_changed(&tank, None).unwrap();
        assert!(notifier.sent().is_empty());

        scheduler.state.lock().unwrap().open_stations.insert(2);
        alarm.percentage_changed(&tank, Some(55)).unwrap();
        assert!(notifier.sent().is_empty());

        scheduler.state.lock().unwrap().open_stations.clear();
        alarm.percentage_changed(&tank, Some(55)).unwrap();
        assert_eq!(notifier.subjects(), vec!["Water Loss"]);
    }
}
