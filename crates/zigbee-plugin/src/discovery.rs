//! Mapping discovered nodes and serial ports to thing descriptors

use std::path::PathBuf;
use zigbee_core::cluster::{ha_device, manufacturer, profile, zll_device};
use zigbee_core::network::DEFAULT_BAUD_RATE;
use zigbee_core::Node;

use crate::platform::{ThingClass, ThingDescriptor, ThingId, ThingParams};

/// Endpoint Lumi/Xiaomi devices use regardless of their descriptors
pub const LUMI_ENDPOINT: u8 = 0x01;

/// Outcome of matching a node against the known device families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMatch {
    pub class: ThingClass,
    pub endpoint: u8,
}

struct Signature {
    class: ThingClass,
    ha: &'static [u16],
    zll: &'static [u16],
}

const IKEA_SIGNATURES: &[Signature] = &[
    Signature {
        class: ThingClass::TradfriColorLight,
        ha: &[ha_device::COLOR_DIMMABLE_LIGHT, ha_device::EXTENDED_COLOR_LIGHT],
        zll: &[zll_device::COLOR_LIGHT, zll_device::EXTENDED_COLOR_LIGHT],
    },
    Signature {
        class: ThingClass::TradfriColorTemperatureLight,
        ha: &[ha_device::COLOR_TEMPERATURE_LIGHT],
        zll: &[zll_device::COLOR_TEMPERATURE_LIGHT],
    },
    Signature {
        class: ThingClass::TradfriDimmableLight,
        ha: &[ha_device::DIMMABLE_LIGHT],
        zll: &[zll_device::DIMMABLE_LIGHT],
    },
    Signature {
        class: ThingClass::TradfriPowerSocket,
        ha: &[
            ha_device::ON_OFF_PLUGIN_UNIT,
            ha_device::MAINS_POWER_OUTLET,
            ha_device::SMART_PLUG,
        ],
        zll: &[zll_device::ON_OFF_PLUGIN],
    },
    Signature {
        class: ThingClass::TradfriRemote,
        ha: &[ha_device::COLOR_SCENE_CONTROLLER],
        zll: &[zll_device::COLOR_SCENE_CONTROLLER],
    },
    Signature {
        class: ThingClass::TradfriOnOffSwitch,
        ha: &[ha_device::NON_COLOR_CONTROLLER],
        zll: &[zll_device::NON_COLOR_CONTROLLER],
    },
    Signature {
        class: ThingClass::TradfriMotionSensor,
        ha: &[ha_device::ON_OFF_SENSOR, ha_device::OCCUPANCY_SENSOR],
        zll: &[zll_device::ON_OFF_SENSOR],
    },
];

const GENERIC_SIGNATURES: &[Signature] = &[
    Signature {
        class: ThingClass::GenericColorLight,
        ha: &[ha_device::COLOR_DIMMABLE_LIGHT, ha_device::EXTENDED_COLOR_LIGHT],
        zll: &[zll_device::COLOR_LIGHT, zll_device::EXTENDED_COLOR_LIGHT],
    },
    Signature {
        class: ThingClass::GenericColorTemperatureLight,
        ha: &[ha_device::COLOR_TEMPERATURE_LIGHT],
        zll: &[zll_device::COLOR_TEMPERATURE_LIGHT],
    },
    Signature {
        class: ThingClass::GenericDimmableLight,
        ha: &[ha_device::DIMMABLE_LIGHT],
        zll: &[zll_device::DIMMABLE_LIGHT],
    },
    Signature {
        class: ThingClass::GenericOnOffLight,
        ha: &[ha_device::ON_OFF_LIGHT],
        zll: &[zll_device::ON_OFF_LIGHT],
    },
    Signature {
        class: ThingClass::GenericPowerSocket,
        ha: &[
            ha_device::ON_OFF_PLUGIN_UNIT,
            ha_device::MAINS_POWER_OUTLET,
            ha_device::SMART_PLUG,
        ],
        zll: &[zll_device::ON_OFF_PLUGIN],
    },
];

const LUMI_MODELS: &[(&str, ThingClass)] = &[
    ("lumi.sensor_ht", ThingClass::LumiTemperatureSensor),
    ("lumi.weather", ThingClass::LumiTemperatureSensor),
    ("lumi.sensor_magnet", ThingClass::LumiMagnetSensor),
    ("lumi.sensor_switch", ThingClass::LumiButtonSensor),
    ("lumi.sensor_motion", ThingClass::LumiMotionSensor),
    ("lumi.sensor_wleak", ThingClass::LumiWaterSensor),
];

fn match_signatures(node: &Node, signatures: &[Signature]) -> Option<NodeMatch> {
    signatures.iter().find_map(|sig| {
        node.find_endpoint(profile::HOME_AUTOMATION, sig.ha)
            .or_else(|| node.find_endpoint(profile::LIGHT_LINK, sig.zll))
            .map(|ep| NodeMatch {
                class: sig.class,
                endpoint: ep.id,
            })
    })
}

/// Lumi model identifier, preferring the fixed endpoint
fn lumi_model(node: &Node) -> Option<&str> {
    node.endpoint(LUMI_ENDPOINT)
        .and_then(|ep| ep.model_identifier.as_deref())
        .or_else(|| node.model_identifier())
}

fn is_lumi(node: &Node) -> bool {
    matches!(
        node.manufacturer_code,
        manufacturer::LUMI | manufacturer::XIAOMI
    ) || lumi_model(node).is_some_and(|model| model.starts_with("lumi."))
}

fn match_lumi(node: &Node) -> Option<NodeMatch> {
    let model = lumi_model(node)?;
    LUMI_MODELS
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, class)| NodeMatch {
            class: *class,
            endpoint: LUMI_ENDPOINT,
        })
}

/// Choose the thing class for a node that joined the network
///
/// Vendor rules win over generic profile matching. The coordinator never
/// matches; it is represented by the controller thing.
#[must_use]
pub fn match_node(node: &Node) -> Option<NodeMatch> {
    if node.is_coordinator() {
        return None;
    }

    let vendor = if node.manufacturer_code == manufacturer::IKEA {
        match_signatures(node, IKEA_SIGNATURES)
    } else if is_lumi(node) {
        match_lumi(node)
    } else {
        None
    };

    vendor.or_else(|| match_signatures(node, GENERIC_SIGNATURES))
}

/// Endpoint an adapter of this class binds to, used when setting up stored things
#[must_use]
pub fn endpoint_for(class: ThingClass, node: &Node) -> Option<u8> {
    match class {
        ThingClass::ZigbeeController => None,
        ThingClass::LumiTemperatureSensor
        | ThingClass::LumiMagnetSensor
        | ThingClass::LumiButtonSensor
        | ThingClass::LumiMotionSensor
        | ThingClass::LumiWaterSensor => node.endpoint(LUMI_ENDPOINT).map(|ep| ep.id),
        other => IKEA_SIGNATURES
            .iter()
            .chain(GENERIC_SIGNATURES)
            .filter(|sig| sig.class == other)
            .find_map(|sig| {
                node.find_endpoint(profile::HOME_AUTOMATION, sig.ha)
                    .or_else(|| node.find_endpoint(profile::LIGHT_LINK, sig.zll))
            })
            .map(|ep| ep.id),
    }
}

/// Descriptor announcing a matched node under its controller
#[must_use]
pub fn node_descriptor(node: &Node, class: ThingClass, parent_id: ThingId) -> ThingDescriptor {
    let endpoint = node
        .endpoint(LUMI_ENDPOINT)
        .filter(|ep| ep.model_identifier.is_some())
        .or_else(|| node.endpoints.first());
    let model = node.model_identifier().map(str::to_string);

    ThingDescriptor {
        thing_class: class,
        title: class.display_name().to_string(),
        description: model.clone().unwrap_or_else(|| node.ieee_address.to_string()),
        parent_id: Some(parent_id),
        params: ThingParams {
            ieee_address: Some(node.ieee_address),
            manufacturer: node.manufacturer_name().map(str::to_string),
            model,
            version: endpoint.and_then(|ep| ep.sw_build_id.clone()),
            ..Default::default()
        },
    }
}

/// Controller descriptors for the given serial ports
#[must_use]
pub fn controller_descriptors(ports: &[PathBuf]) -> Vec<ThingDescriptor> {
    ports
        .iter()
        .map(|port| {
            let port = port.to_string_lossy().to_string();
            ThingDescriptor {
                thing_class: ThingClass::ZigbeeController,
                title: ThingClass::ZigbeeController.display_name().to_string(),
                description: port.clone(),
                parent_id: None,
                params: ThingParams {
                    serial_port: Some(port),
                    baud_rate: Some(DEFAULT_BAUD_RATE),
                    ..Default::default()
                },
            }
        })
        .collect()
}

/// Enumerate serial ports as candidate controllers
#[must_use]
pub fn discover_controllers() -> Vec<ThingDescriptor> {
    match serial2::SerialPort::available_ports() {
        Ok(ports) => {
            tracing::debug!("Found {} serial ports", ports.len());
            controller_descriptors(&ports)
        }
        Err(e) => {
            tracing::warn!("Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use zigbee_core::cluster::id;
    use zigbee_core::{Endpoint, IeeeAddress};

    pub(crate) fn node_with(
        ieee: u64,
        manufacturer_code: u16,
        profile_id: u16,
        device_id: u16,
        in_clusters: Vec<u16>,
    ) -> Node {
        let mut node = Node::new(IeeeAddress::from_u64(ieee), 0x1234);
        node.manufacturer_code = manufacturer_code;
        node.endpoints.push(Endpoint {
            id: 1,
            profile_id,
            device_id,
            in_clusters,
            ..Default::default()
        });
        node
    }

    pub(crate) fn lumi_node(ieee: u64, model: &str) -> Node {
        let mut node = node_with(ieee, manufacturer::LUMI, profile::HOME_AUTOMATION, 0x5F01, vec![
            id::BASIC,
        ]);
        node.endpoints[0].model_identifier = Some(model.to_string());
        node
    }

    #[test]
    fn coordinator_is_skipped() {
        let mut node = node_with(1, 0, profile::HOME_AUTOMATION, ha_device::ON_OFF_LIGHT, vec![]);
        node.nwk_address = 0x0000;
        assert_eq!(match_node(&node), None);
    }

    #[test]
    fn ikea_color_temperature_bulb() {
        let node = node_with(
            2,
            manufacturer::IKEA,
            profile::LIGHT_LINK,
            zll_device::COLOR_TEMPERATURE_LIGHT,
            vec![id::ON_OFF, id::LEVEL_CONTROL, id::COLOR_CONTROL],
        );
        assert_eq!(
            match_node(&node),
            Some(NodeMatch {
                class: ThingClass::TradfriColorTemperatureLight,
                endpoint: 1,
            })
        );
    }

    #[test]
    fn ikea_remote_and_switch() {
        let remote = node_with(
            3,
            manufacturer::IKEA,
            profile::HOME_AUTOMATION,
            ha_device::COLOR_SCENE_CONTROLLER,
            vec![],
        );
        assert_eq!(match_node(&remote).unwrap().class, ThingClass::TradfriRemote);
        let switch = node_with(
            4,
            manufacturer::IKEA,
            profile::HOME_AUTOMATION,
            ha_device::NON_COLOR_CONTROLLER,
            vec![],
        );
        assert_eq!(match_node(&switch).unwrap().class, ThingClass::TradfriOnOffSwitch);
    }

    #[test]
    fn generic_lights_by_profile() {
        let node =
            node_with(5, 0x100B, profile::HOME_AUTOMATION, ha_device::EXTENDED_COLOR_LIGHT, vec![]);
        assert_eq!(match_node(&node).unwrap().class, ThingClass::GenericColorLight);
        let plug = node_with(6, 0x1234, profile::LIGHT_LINK, zll_device::ON_OFF_PLUGIN, vec![]);
        assert_eq!(match_node(&plug).unwrap().class, ThingClass::GenericPowerSocket);
    }

    #[test]
    fn lumi_models_by_prefix() {
        let cases = [
            ("lumi.sensor_ht", ThingClass::LumiTemperatureSensor),
            ("lumi.weather", ThingClass::LumiTemperatureSensor),
            ("lumi.sensor_magnet.aq2", ThingClass::LumiMagnetSensor),
            ("lumi.sensor_switch", ThingClass::LumiButtonSensor),
            ("lumi.sensor_motion.aq2", ThingClass::LumiMotionSensor),
            ("lumi.sensor_wleak.aq1", ThingClass::LumiWaterSensor),
        ];
        for (model, class) in cases {
            assert_eq!(
                match_node(&lumi_node(7, model)),
                Some(NodeMatch {
                    class,
                    endpoint: LUMI_ENDPOINT,
                }),
                "{model}"
            );
        }
    }

    #[test]
    fn lumi_recognised_by_model_without_manufacturer_code() {
        let mut node = lumi_node(8, "lumi.sensor_magnet");
        node.manufacturer_code = 0;
        assert_eq!(match_node(&node).unwrap().class, ThingClass::LumiMagnetSensor);
    }

    #[test]
    fn unknown_node_stays_unmatched() {
        let node = lumi_node(9, "lumi.ctrl_neutral1");
        assert_eq!(match_node(&node), None);
        let other = node_with(10, 0x1234, profile::HOME_AUTOMATION, 0x0302, vec![]);
        assert_eq!(match_node(&other), None);
    }

    #[test]
    fn descriptor_carries_node_params() {
        let node = lumi_node(0x00158d0001020304, "lumi.sensor_magnet");
        let parent = ThingId::new();
        let descriptor = node_descriptor(&node, ThingClass::LumiMagnetSensor, parent);
        assert_eq!(descriptor.parent_id, Some(parent));
        assert_eq!(descriptor.params.ieee_address, Some(node.ieee_address));
        assert_eq!(descriptor.params.model.as_deref(), Some("lumi.sensor_magnet"));
    }

    #[test]
    fn endpoint_lookup_for_stored_things() {
        let node = node_with(
            11,
            manufacturer::IKEA,
            profile::HOME_AUTOMATION,
            ha_device::DIMMABLE_LIGHT,
            vec![],
        );
        assert_eq!(endpoint_for(ThingClass::TradfriDimmableLight, &node), Some(1));
        assert_eq!(endpoint_for(ThingClass::GenericDimmableLight, &node), Some(1));
        assert_eq!(endpoint_for(ThingClass::GenericColorLight, &node), None);
    }

    #[test]
    fn ports_become_controllers() {
        let descriptors = controller_descriptors(&[PathBuf::from("/dev/ttyACM0")]);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].thing_class, ThingClass::ZigbeeController);
        assert_eq!(descriptors[0].params.serial_port.as_deref(), Some("/dev/ttyACM0"));
    }
}
