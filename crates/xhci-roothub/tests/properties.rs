mod util;

use proptest::prelude::*;

use util::*;
use xhci_roothub::control::*;
use xhci_roothub::descriptor::SS_HUB_MAX_PORTS;
use xhci_roothub::port::PortMap;
use xhci_roothub::{PortChange, RootHubError, SpeedClass, SupportedProtocol};

/// `ClearPortFeature` selector for each `wPortChange` bit, indexed by bit number.
const CLEAR_FEATURE_FOR_BIT: [u16; 8] = [
    HUB_PORT_FEATURE_C_PORT_CONNECTION,
    HUB_PORT_FEATURE_C_PORT_ENABLE,
    HUB_PORT_FEATURE_C_PORT_SUSPEND,
    HUB_PORT_FEATURE_C_PORT_OVER_CURRENT,
    HUB_PORT_FEATURE_C_PORT_RESET,
    HUB_PORT_FEATURE_C_BH_PORT_RESET,
    HUB_PORT_FEATURE_C_PORT_LINK_STATE,
    HUB_PORT_FEATURE_C_PORT_CONFIG_ERROR,
];

#[derive(Debug, Clone)]
enum Op {
    Notify { port: usize, bits: u16 },
    Clear { port: usize, bit: usize },
}

fn op_strategy(num_ports: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (1..=num_ports, 0u16..0x100).prop_map(|(port, bits)| Op::Notify { port, bits }),
        (1..=num_ports, 0usize..8).prop_map(|(port, bit)| Op::Clear { port, bit }),
    ]
}

fn protocol_strategy() -> impl Strategy<Value = SupportedProtocol> {
    (2u8..=3, 0u8..=20, 0u8..=10).prop_map(|(major, port_offset, port_count)| {
        SupportedProtocol {
            major_revision: major,
            minor_revision: 0,
            port_offset,
            port_count,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn change_bits_reported_iff_delivered_and_not_cleared(
        superspeed in any::<bool>(),
        ops in prop::collection::vec(op_strategy(2), 0..40),
    ) {
        let class = if superspeed { SpeedClass::SuperSpeed } else { SpeedClass::Usb2 };
        let ctrl = FakeController::mixed();
        let hub = hub(&ctrl, class);
        let num_ports = hub.port_count();
        prop_assert!(num_ports >= 2);

        let valid = PortChange::valid_for(class).bits();
        let mut model = vec![0u16; num_ports + 1];

        for op in ops {
            match op {
                Op::Notify { port, bits } => {
                    let physical = hub.port_map().physical_port(port).unwrap();
                    let bits = PortChange::from_bits_retain(bits);
                    prop_assert!(hub.notify_port_changed(physical, bits));
                    model[port] |= bits.bits() & valid;
                }
                Op::Clear { port, bit } => {
                    let res = clear_port_feature(&hub, port as u16, CLEAR_FEATURE_FOR_BIT[bit]);
                    if valid & (1 << bit) != 0 {
                        prop_assert!(res.is_ok());
                        model[port] &= !(1 << bit);
                    } else {
                        let rejected = matches!(res, Err(RootHubError::InvalidFeature { .. }));
                        prop_assert!(rejected);
                    }
                }
            }

            for port in 1..=num_ports {
                let (_, change) = get_port_status(&hub, port as u16).unwrap();
                prop_assert_eq!(change, model[port], "port {}", port);
            }
        }
    }

    #[test]
    fn port_maps_are_disjoint_bijections_onto_each_class(
        protocols in prop::collection::vec(protocol_strategy(), 0..6),
        controller_ports in 1u8..=16,
    ) {
        let usb2 = PortMap::build(&protocols, SpeedClass::Usb2, controller_ports);
        let usb3 = PortMap::build(&protocols, SpeedClass::SuperSpeed, controller_ports);

        // Assign owners range by range: an entry only claims ports no earlier entry covered.
        let mut owner: Vec<Option<u8>> = vec![None; usize::from(controller_ports) + 1];
        for proto in &protocols {
            let start = usize::from(proto.port_offset).max(1);
            let end = usize::from(proto.port_offset) + usize::from(proto.port_count);
            for slot in owner.iter_mut().take(end).skip(start) {
                if slot.is_none() {
                    *slot = Some(proto.major_revision);
                }
            }
        }

        // Major revision, map and port cap per speed class.
        let classes = [(2u8, &usb2, usize::MAX), (3u8, &usb3, SS_HUB_MAX_PORTS)];
        for (major, map, limit) in classes {
            let mut expected: Vec<u8> = (1..=controller_ports)
                .filter(|&p| owner[usize::from(p)] == Some(major))
                .collect();
            expected.truncate(limit);
            prop_assert_eq!(map.physical_ports(), expected.as_slice());

            for port in 1..=map.len() {
                let physical = map.physical_port(port).unwrap();
                prop_assert_eq!(map.virtual_port(physical), Some(port));
            }
            prop_assert_eq!(map.physical_port(map.len() + 1), None);
        }

        for &p in usb2.physical_ports() {
            prop_assert_eq!(usb3.virtual_port(p), None);
        }
    }
}
