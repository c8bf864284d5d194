//! Device UPnP : services, verrou du device, dispatch et relevé d'état.
//!
//! Un [`Device`] possède le contexte applicatif `C` (lecteur, adaptateurs) et
//! les services déclarés, le tout derrière un seul verrou. Le dispatch des
//! actions et le relevé des événements passent par ce verrou : un handler ne
//! modifie jamais l'état pendant que la boucle d'événements le compare.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::dispatch::{ActionSpec, ArgSpec, PendingAction};
use crate::errors::{ActionError, ActionResult};
use crate::lastchange::lastchange_document;
use crate::state::{StateVariableMap, diff_state};

/// Manière dont un service publie ses variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStyle {
    /// Chaque variable modifiée devient une propriété (OpenHome).
    Properties,

    /// Une unique variable `LastChange` regroupe les changements.
    ///
    /// Un relevé dont les seuls changements portent sur `quiet` n'émet rien et
    /// conserve l'instantané précédent.
    LastChange {
        namespace: &'static str,
        quiet: &'static [&'static str],
        channel_vars: &'static [&'static str],
    },

    /// Publie uniquement sur demande d'état complet.
    AllOnly,
}

/// Calcul de l'état complet d'un service depuis le contexte.
pub type MakeState<C> = fn(&mut C) -> StateVariableMap;

/// Déclaration d'un service : identité, actions, état, style d'événements.
pub struct ServiceDef<C> {
    pub service_type: &'static str,
    pub service_id: &'static str,
    pub actions: Vec<ActionSpec<C>>,
    pub makestate: MakeState<C>,
    pub event_style: EventStyle,
}

/// Description publique d'une action (SCPD).
#[derive(Debug, Clone)]
pub struct ActionInfo {
    pub name: &'static str,
    pub args: &'static [ArgSpec],
    pub outs: &'static [&'static str],
}

/// Description publique d'un service.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub service_type: &'static str,
    pub service_id: &'static str,
    pub actions: Vec<ActionInfo>,
}

impl ServiceInfo {
    /// Nom court utilisé dans les URLs (`urn:upnp-org:serviceId:AVTransport` → `AVTransport`).
    pub fn short_name(&self) -> &'static str {
        service_short_name(self.service_id)
    }
}

pub fn service_short_name(service_id: &'static str) -> &'static str {
    service_id.rsplit(':').next().unwrap_or(service_id)
}

/// Variables publiées pour un service lors d'un relevé.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEvent {
    pub service_id: &'static str,
    pub properties: Vec<(String, String)>,
}

/// Identité du device.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    /// UUID sans le préfixe `uuid:`
    pub udn: String,
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: String,
    pub model_name: String,
    pub model_number: String,
    pub model_description: String,
}

/// Signal de réveil de la boucle d'événements.
#[derive(Debug, Clone, Default)]
pub struct EventWaker {
    notify: Arc<Notify>,
}

impl EventWaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&self) {
        self.notify.notify_one();
    }

    pub async fn woken(&self) {
        self.notify.notified().await
    }
}

/// Vue objet d'un device, utilisée par le serveur HTTP et l'eventing.
pub trait UpnpDevice: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    fn services(&self) -> Vec<ServiceInfo>;

    /// Noms des variables évènementielles d'un service (SCPD).
    fn state_variables(&self, service_id: &str) -> Vec<String>;

    /// Décode, exécute et encode un appel d'action.
    fn dispatch(
        &self,
        service_id: &str,
        action: &str,
        args: &HashMap<String, String>,
    ) -> ActionResult<Vec<(String, String)>>;

    /// État complet d'un service pour l'événement initial d'un abonnement.
    ///
    /// `on_snapshot` est appelé sous le verrou du device, avant tout relevé
    /// ultérieur. Ne modifie pas l'instantané utilisé pour les différences.
    fn initial_event(
        &self,
        service_id: &str,
        on_snapshot: &mut dyn FnMut(),
    ) -> Option<Vec<(String, String)>>;

    /// Relevé périodique : changements (ou état complet si `all`) par service.
    fn event_data(&self, all: bool) -> Vec<ServiceEvent>;

    fn waker(&self) -> EventWaker;
}

struct ServiceSlot<C> {
    def: ServiceDef<C>,
    snapshot: StateVariableMap,
}

impl<C> ServiceSlot<C> {
    fn event_data(&mut self, ctx: &mut C, all: bool) -> Vec<(String, String)> {
        match self.def.event_style {
            EventStyle::AllOnly => {
                if all {
                    (self.def.makestate)(ctx).into_iter().collect()
                } else {
                    Vec::new()
                }
            }
            EventStyle::Properties => {
                let current = (self.def.makestate)(ctx);
                let changed = if all {
                    current.clone()
                } else {
                    diff_state(&self.snapshot, &current)
                };
                self.snapshot = current;
                changed.into_iter().collect()
            }
            EventStyle::LastChange {
                namespace,
                quiet,
                channel_vars,
            } => {
                let current = (self.def.makestate)(ctx);
                let changed = if all {
                    current.clone()
                } else {
                    diff_state(&self.snapshot, &current)
                };
                if changed.keys().all(|k| quiet.contains(&k.as_str())) {
                    return Vec::new();
                }
                let doc = lastchange_document(namespace, &changed, channel_vars);
                self.snapshot = current;
                vec![("LastChange".to_string(), doc)]
            }
        }
    }

    fn initial_event(&self, ctx: &mut C) -> Vec<(String, String)> {
        let current = (self.def.makestate)(ctx);
        match self.def.event_style {
            EventStyle::LastChange {
                namespace,
                channel_vars,
                ..
            } => vec![(
                "LastChange".to_string(),
                lastchange_document(namespace, &current, channel_vars),
            )],
            EventStyle::Properties | EventStyle::AllOnly => current.into_iter().collect(),
        }
    }

    fn state_variables(&self, ctx: &mut C) -> Vec<String> {
        match self.def.event_style {
            EventStyle::LastChange { .. } => vec!["LastChange".to_string()],
            _ => (self.def.makestate)(ctx).into_keys().collect(),
        }
    }

    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            service_type: self.def.service_type,
            service_id: self.def.service_id,
            actions: self
                .def
                .actions
                .iter()
                .map(|a| ActionInfo {
                    name: a.name,
                    args: a.args,
                    outs: a.outs,
                })
                .collect(),
        }
    }
}

struct DeviceInner<C> {
    ctx: C,
    slots: Vec<ServiceSlot<C>>,
}

/// Device générique sur son contexte applicatif.
pub struct Device<C> {
    info: DeviceInfo,
    /// Figé à la construction : consultable sans prendre le verrou
    service_infos: Vec<ServiceInfo>,
    inner: Mutex<DeviceInner<C>>,
    waker: EventWaker,
}

impl<C: Send + 'static> Device<C> {
    pub fn new(info: DeviceInfo, ctx: C, services: Vec<ServiceDef<C>>) -> Self {
        Self::with_waker(info, ctx, services, EventWaker::new())
    }

    /// Variante utilisée quand le contexte doit lui-même réveiller la boucle.
    pub fn with_waker(
        info: DeviceInfo,
        ctx: C,
        services: Vec<ServiceDef<C>>,
        waker: EventWaker,
    ) -> Self {
        let slots: Vec<ServiceSlot<C>> = services
            .into_iter()
            .map(|def| ServiceSlot {
                def,
                snapshot: StateVariableMap::new(),
            })
            .collect();
        Self {
            info,
            service_infos: slots.iter().map(|slot| slot.info()).collect(),
            inner: Mutex::new(DeviceInner { ctx, slots }),
            waker,
        }
    }

    /// Accès au contexte sous le verrou du device.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        let mut inner = self.inner.lock();
        f(&mut inner.ctx)
    }
}

impl<C: Send + 'static> UpnpDevice for Device<C> {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn services(&self) -> Vec<ServiceInfo> {
        self.service_infos.clone()
    }

    fn state_variables(&self, service_id: &str) -> Vec<String> {
        let mut guard = self.inner.lock();
        let DeviceInner { ctx, slots } = &mut *guard;
        slots
            .iter()
            .find(|s| s.def.service_id == service_id)
            .map(|slot| slot.state_variables(ctx))
            .unwrap_or_default()
    }

    fn dispatch(
        &self,
        service_id: &str,
        action: &str,
        args: &HashMap<String, String>,
    ) -> ActionResult<Vec<(String, String)>> {
        let (result, wake) = {
            let mut guard = self.inner.lock();
            let DeviceInner { ctx, slots } = &mut *guard;

            let slot = slots
                .iter()
                .find(|s| s.def.service_id == service_id)
                .ok_or_else(|| ActionError::InvalidService(service_id.to_string()))?;
            let spec = *slot
                .def
                .actions
                .iter()
                .find(|a| a.name == action)
                .ok_or_else(|| ActionError::InvalidAction(action.to_string()))?;

            let call = PendingAction::decode(action, spec.args, args)?;
            debug!("➡️ {} {}", service_short_name(slot.def.service_id), action);
            let result = (spec.handler)(ctx, &call).map(|out| out.into_ordered(spec.outs));
            (result, call.wake_requested())
        };

        if wake {
            self.waker.wake();
        }
        if let Err(e) = &result {
            warn!("❌ {} failed: {}", action, e);
        }
        result
    }

    fn initial_event(
        &self,
        service_id: &str,
        on_snapshot: &mut dyn FnMut(),
    ) -> Option<Vec<(String, String)>> {
        let mut guard = self.inner.lock();
        let DeviceInner { ctx, slots } = &mut *guard;
        let properties = slots
            .iter()
            .find(|s| s.def.service_id == service_id)
            .map(|slot| slot.initial_event(ctx))?;
        on_snapshot();
        Some(properties)
    }

    fn event_data(&self, all: bool) -> Vec<ServiceEvent> {
        let mut guard = self.inner.lock();
        let DeviceInner { ctx, slots } = &mut *guard;
        slots
            .iter_mut()
            .filter_map(|slot| {
                let properties = slot.event_data(ctx, all);
                if properties.is_empty() {
                    None
                } else {
                    Some(ServiceEvent {
                        service_id: slot.def.service_id,
                        properties,
                    })
                }
            })
            .collect()
    }

    fn waker(&self) -> EventWaker {
        self.waker.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ArgValue, SoapOutgoing};
    use crate::lastchange::AVT_NAMESPACE;
    use crate::state::state_map;

    #[derive(Default)]
    struct Counter {
        value: i32,
        position: u32,
        calls: u32,
    }

    fn set_value(c: &mut Counter, call: &PendingAction) -> ActionResult<SoapOutgoing> {
        c.calls += 1;
        c.value = call.i32("Value")?;
        call.wake();
        Ok(SoapOutgoing::new())
    }

    fn get_value(c: &mut Counter, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
        c.calls += 1;
        Ok(SoapOutgoing::new()
            .arg("Max", "100")
            .arg("Value", c.value.to_string()))
    }

    fn counter_state(c: &mut Counter) -> StateVariableMap {
        state_map([
            ("Value", c.value.to_string()),
            ("Position", c.position.to_string()),
        ])
    }

    const SET_VALUE_ARGS: &[ArgSpec] = &[ArgSpec::i4("Value")];

    fn device(style: EventStyle) -> Device<Counter> {
        let service = ServiceDef {
            service_type: "urn:schemas-upnp-org:service:Counter:1",
            service_id: "urn:upnp-org:serviceId:Counter",
            actions: vec![
                ActionSpec::new("SetValue", SET_VALUE_ARGS, &[], set_value),
                ActionSpec::new("GetValue", &[], &["Value", "Max"], get_value),
            ],
            makestate: counter_state,
            event_style: style,
        };
        Device::new(DeviceInfo::default(), Counter::default(), vec![service])
    }

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const ID: &str = "urn:upnp-org:serviceId:Counter";

    #[test]
    fn test_dispatch_routes_and_orders() {
        let dev = device(EventStyle::Properties);
        dev.dispatch(ID, "SetValue", &args(&[("Value", "7")])).unwrap();
        let out = dev.dispatch(ID, "GetValue", &HashMap::new()).unwrap();
        assert_eq!(
            out,
            vec![
                ("Value".to_string(), "7".to_string()),
                ("Max".to_string(), "100".to_string())
            ]
        );
    }

    #[test]
    fn test_dispatch_errors() {
        let dev = device(EventStyle::Properties);
        let unknown_service = dev.dispatch("urn:x:serviceId:Nope", "GetValue", &HashMap::new());
        assert!(matches!(unknown_service, Err(ActionError::InvalidService(_))));

        let unknown_action = dev.dispatch(ID, "Frobnicate", &HashMap::new());
        assert!(matches!(unknown_action, Err(ActionError::InvalidAction(_))));

        let bad = dev.dispatch(ID, "SetValue", &args(&[("Value", "seven")]));
        assert_eq!(bad.unwrap_err().code(), 402);
        // Le handler n'a pas été appelé
        assert_eq!(dev.with_context(|c| c.calls), 0);
    }

    #[test]
    fn test_properties_events_diff_and_snapshot() {
        let dev = device(EventStyle::Properties);
        let first = dev.event_data(false);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].properties.len(), 2);

        assert!(dev.event_data(false).is_empty());

        dev.with_context(|c| c.value = 3);
        let changed = dev.event_data(false);
        assert_eq!(
            changed[0].properties,
            vec![("Value".to_string(), "3".to_string())]
        );

        let all = dev.event_data(true);
        assert_eq!(all[0].properties.len(), 2);
    }

    #[test]
    fn test_lastchange_quiet_vars_keep_snapshot() {
        let dev = device(EventStyle::LastChange {
            namespace: AVT_NAMESPACE,
            quiet: &["Position"],
            channel_vars: &[],
        });
        let first = dev.event_data(false);
        assert_eq!(first[0].properties[0].0, "LastChange");

        // Seule la position change : rien n'est émis
        dev.with_context(|c| c.position = 10);
        assert!(dev.event_data(false).is_empty());

        // Un vrai changement emporte aussi la position accumulée
        dev.with_context(|c| c.value = 1);
        let ev = dev.event_data(false);
        let doc = &ev[0].properties[0].1;
        assert!(doc.contains("<Value val=\"1\"/>"));
        assert!(doc.contains("<Position val=\"10\"/>"));
    }

    #[test]
    fn test_all_only_and_initial_event() {
        let dev = device(EventStyle::AllOnly);
        assert!(dev.event_data(false).is_empty());
        assert_eq!(dev.event_data(true)[0].properties.len(), 2);

        let dev = device(EventStyle::Properties);
        let initial = dev.initial_event(ID, &mut || {}).unwrap();
        assert_eq!(initial.len(), 2);
        // L'événement initial ne consomme pas l'instantané
        assert_eq!(dev.event_data(false)[0].properties.len(), 2);

        let mut called = false;
        assert!(dev.initial_event("urn:x:serviceId:Nope", &mut || called = true).is_none());
        assert!(!called);
    }

    #[test]
    fn test_subscriber_ready_before_next_diff() {
        use crate::eventing::SubscriptionRegistry;

        let dev = device(EventStyle::Properties);
        dev.event_data(false);
        let registry = SubscriptionRegistry::new();
        let sid = registry.subscribe("dev", ID, vec!["http://h/cb".into()], 1800);

        let mut target = None;
        let initial = dev
            .initial_event(ID, &mut || target = registry.take_initial_target(&sid))
            .unwrap();
        assert!(initial.contains(&("Value".to_string(), "0".to_string())));
        assert_eq!(target.unwrap().seq, 0);

        // Un changement postérieur à l'instantané atteint le nouvel abonné
        dev.with_context(|c| c.value = 4);
        let changed = dev.event_data(false);
        assert_eq!(changed[0].properties, vec![("Value".to_string(), "4".to_string())]);
        let targets = registry.targets("dev", ID);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].seq, 1);
    }

    #[test]
    fn test_pending_action_from_values() {
        let call = PendingAction::from_values("SetValue", [("Value", ArgValue::Int(5))]);
        let mut c = Counter::default();
        set_value(&mut c, &call).unwrap();
        assert_eq!(c.value, 5);
        assert!(call.wake_requested());
    }
}
