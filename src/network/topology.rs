//! Topology wiring
//!
//! Matches the link names referenced by namespace device rosters to the
//! configured links and wires each one into the namespaces that reference it.

use crate::error::{Error, Result};
use crate::network::bridge::Bridge;
use crate::network::command::Runner;
use crate::network::direct_link::DirectLink;
use crate::network::namespace::Namespace;

/// Link names in first-reference order, each with the indices of the
/// namespaces that reference it
///
/// A namespace appears once per roster entry, so a namespace naming the same
/// link twice contributes two indices.
pub fn link_references(namespaces: &[Namespace]) -> Vec<(String, Vec<usize>)> {
    let mut refs: Vec<(String, Vec<usize>)> = Vec::new();

    for (idx, ns) in namespaces.iter().enumerate() {
        for entry in &ns.devices {
            match refs.iter_mut().find(|(name, _)| *name == entry.device.name) {
                Some((_, idxs)) => idxs.push(idx),
                None => refs.push((entry.device.name.clone(), vec![idx])),
            }
        }
    }

    refs
}

/// How a referenced link name would be wired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wiring {
    Direct { link: String, left: usize, right: usize },
    Bridge { link: String, targets: Vec<usize> },
}

/// Resolve every referenced link name without touching the host
///
/// Fails on the first name that is referenced once, referenced more than
/// twice by anything but a bridge, or not configured at all. A configured
/// link that no namespace references is rejected too, since it could never
/// be wired and so never destroyed.
pub fn plan(
    namespaces: &[Namespace],
    direct_links: &[DirectLink],
    bridges: &[Bridge],
) -> Result<Vec<Wiring>> {
    let refs = link_references(namespaces);
    let unused = direct_links
        .iter()
        .map(|l| l.name.as_str())
        .chain(bridges.iter().map(|b| b.name.as_str()))
        .find(|name| !refs.iter().any(|(r, _)| r == name))
        .map(str::to_string);

    let mut wirings = Vec::new();

    for (name, idxs) in refs {
        if idxs.len() == 1 {
            return Err(Error::SingleEndpoint {
                namespace: namespaces[idxs[0]].name.clone(),
                link: name,
            });
        }

        let is_bridge = bridges.iter().any(|b| b.name == name);

        if idxs.len() > 2 && !is_bridge {
            return Err(Error::FanOut {
                degree: idxs.len(),
                link: name,
            });
        }

        if is_bridge {
            wirings.push(Wiring::Bridge {
                link: name,
                targets: idxs,
            });
        } else if direct_links.iter().any(|l| l.name == name) {
            wirings.push(Wiring::Direct {
                link: name,
                left: idxs[0],
                right: idxs[1],
            });
        } else {
            return Err(Error::UnknownLink(name));
        }
    }

    if let Some(name) = unused {
        return Err(Error::UnusedLink(name));
    }

    Ok(wirings)
}

/// Wire every referenced link into its namespaces
///
/// The whole topology is validated before the first wire call. Any wiring
/// failure aborts the pass; links wired before it stay wired.
pub fn wire_all(
    namespaces: &mut [Namespace],
    direct_links: &mut [DirectLink],
    bridges: &mut [Bridge],
    runner: &Runner,
) -> Result<()> {
    let wirings = plan(namespaces, direct_links, bridges)?;

    for wiring in wirings {
        match wiring {
            Wiring::Direct { link, left, right } => {
                // plan() only emits names it found
                let Some(target) = direct_links.iter_mut().find(|l| l.name == link) else {
                    return Err(Error::UnknownLink(link));
                };
                target
                    .wire(namespaces, left, right, runner)
                    .map_err(|e| Error::Wire {
                        link,
                        source: Box::new(e),
                    })?;
            }
            Wiring::Bridge { link, targets } => {
                let Some(target) = bridges.iter_mut().find(|b| b.name == link) else {
                    return Err(Error::UnknownLink(link));
                };
                target
                    .wire(namespaces, &targets, runner)
                    .map_err(|e| Error::Wire {
                        link,
                        source: Box::new(e),
                    })?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{LinkConfig, LinkMode, NamespaceConfig};
    use crate::network::command::{IpCommand, Recorder};
    use crate::network::link::init_links;
    use crate::network::namespace::init_namespaces;

    fn build(
        runner: &Runner,
        namespaces: Vec<NamespaceConfig>,
        links: Vec<LinkConfig>,
    ) -> (Vec<Namespace>, Vec<DirectLink>, Vec<Bridge>) {
        let direct = init_links(&links, runner);
        let bridges = init_links(&links, runner);
        let nss = init_namespaces(&namespaces, runner).unwrap();
        (nss, direct, bridges)
    }

    fn wire_calls(recorder: &Recorder) -> usize {
        recorder.count(|c| matches!(c, IpCommand::LinkSetNetns { .. }))
    }

    #[test]
    fn test_link_references_counts_duplicates() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let configs = vec![
            NamespaceConfig::new("ns-a")
                .device("link0", "10.0.0.1/24")
                .device("link0", "10.0.0.3/24"),
            NamespaceConfig::new("ns-b")
                .device("link1", "10.0.1.2/24")
                .device("link0", "10.0.0.2/24"),
        ];
        let nss = init_namespaces(&configs, &runner).unwrap();

        let mut refs = link_references(&nss);
        refs.sort();
        assert_eq!(
            refs,
            vec![
                ("link0".to_string(), vec![0, 0, 1]),
                ("link1".to_string(), vec![1]),
            ]
        );
    }

    #[test]
    fn test_wires_degree_two() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let (mut nss, mut direct, mut bridges) = build(
            &runner,
            vec![
                NamespaceConfig::new("ns-a").device("link0", "10.0.0.1/24"),
                NamespaceConfig::new("ns-b").device("link0", "10.0.0.2/24"),
            ],
            vec![LinkConfig::new("link0", LinkMode::DirectLink)],
        );

        assert!(!direct[0].busy);
        wire_all(&mut nss, &mut direct, &mut bridges, &runner).unwrap();
        assert!(direct[0].busy);
        assert!(nss.iter().all(|ns| ns.devices[0].configured));
    }

    #[test]
    fn test_single_reference_rejected_before_wiring() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let (mut nss, mut direct, mut bridges) = build(
            &runner,
            vec![NamespaceConfig::new("ns-a").device("link0", "10.0.0.1/24")],
            vec![LinkConfig::new("link0", LinkMode::DirectLink)],
        );

        let err = wire_all(&mut nss, &mut direct, &mut bridges, &runner).unwrap_err();
        assert!(matches!(err, Error::SingleEndpoint { ref link, .. } if link == "link0"));
        assert_eq!(wire_calls(&recorder), 0);
        assert!(!direct[0].busy);
    }

    #[test]
    fn test_three_references_rejected_before_wiring() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let (mut nss, mut direct, mut bridges) = build(
            &runner,
            vec![
                NamespaceConfig::new("ns-a").device("link0", "10.0.0.1/24"),
                NamespaceConfig::new("ns-b").device("link0", "10.0.0.2/24"),
                NamespaceConfig::new("ns-c").device("link0", "10.0.0.3/24"),
            ],
            vec![LinkConfig::new("link0", LinkMode::DirectLink)],
        );

        let err = wire_all(&mut nss, &mut direct, &mut bridges, &runner).unwrap_err();
        assert!(err.to_string().contains("link0"));
        assert!(matches!(err, Error::FanOut { degree: 3, .. }));
        assert_eq!(wire_calls(&recorder), 0);
        assert!(!direct[0].busy);
    }

    #[test]
    fn test_invalid_name_blocks_all_wiring() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let (mut nss, mut direct, mut bridges) = build(
            &runner,
            vec![
                NamespaceConfig::new("ns-a")
                    .device("link0", "10.0.0.1/24")
                    .device("link1", "10.0.1.1/24"),
                NamespaceConfig::new("ns-b").device("link0", "10.0.0.2/24"),
            ],
            vec![
                LinkConfig::new("link0", LinkMode::DirectLink),
                LinkConfig::new("link1", LinkMode::DirectLink),
            ],
        );

        assert!(wire_all(&mut nss, &mut direct, &mut bridges, &runner).is_err());
        assert_eq!(wire_calls(&recorder), 0);
        assert!(direct.iter().all(|l| !l.busy));
    }

    #[test]
    fn test_unknown_link_rejected() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let (mut nss, mut direct, mut bridges) = build(
            &runner,
            vec![
                NamespaceConfig::new("ns-a").device("link9", "10.0.0.1/24"),
                NamespaceConfig::new("ns-b").device("link9", "10.0.0.2/24"),
            ],
            vec![LinkConfig::new("link0", LinkMode::DirectLink)],
        );

        let err = wire_all(&mut nss, &mut direct, &mut bridges, &runner).unwrap_err();
        assert!(matches!(err, Error::UnknownLink(ref name) if name == "link9"));
    }

    #[test]
    fn test_unreferenced_link_rejected_before_wiring() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let (mut nss, mut direct, mut bridges) = build(
            &runner,
            vec![
                NamespaceConfig::new("ns-a").device("link0", "10.0.0.1/24"),
                NamespaceConfig::new("ns-b").device("link0", "10.0.0.2/24"),
            ],
            vec![
                LinkConfig::new("link0", LinkMode::DirectLink),
                LinkConfig::new("spare", LinkMode::DirectLink),
                LinkConfig::new("br-spare", LinkMode::Bridge),
            ],
        );

        let err = wire_all(&mut nss, &mut direct, &mut bridges, &runner).unwrap_err();
        assert!(matches!(err, Error::UnusedLink(ref name) if name == "spare"));
        assert_eq!(wire_calls(&recorder), 0);
        assert!(direct.iter().all(|l| !l.busy));
    }

    #[test]
    fn test_bridge_accepts_fan_out() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let (mut nss, mut direct, mut bridges) = build(
            &runner,
            vec![
                NamespaceConfig::new("ns-a").device("br0", "10.1.0.1/24"),
                NamespaceConfig::new("ns-b").device("br0", "10.1.0.2/24"),
                NamespaceConfig::new("ns-c").device("br0", "10.1.0.3/24"),
            ],
            vec![LinkConfig::new("br0", LinkMode::Bridge)],
        );

        wire_all(&mut nss, &mut direct, &mut bridges, &runner).unwrap();
        assert!(bridges[0].busy);
        assert_eq!(bridges[0].ports.len(), 3);
        assert_eq!(wire_calls(&recorder), 3);
    }

    #[test]
    fn test_wire_failure_aborts_pass() {
        let recorder = Recorder::new();
        recorder.fail_on(IpCommand::LinkSetNetns {
            device: "link0-right".into(),
            namespace: "ns-b".into(),
        });
        let runner = Runner::new(&recorder, false);
        let (mut nss, mut direct, mut bridges) = build(
            &runner,
            vec![
                NamespaceConfig::new("ns-a").device("link0", "10.0.0.1/24"),
                NamespaceConfig::new("ns-b").device("link0", "10.0.0.2/24"),
            ],
            vec![LinkConfig::new("link0", LinkMode::DirectLink)],
        );

        let err = wire_all(&mut nss, &mut direct, &mut bridges, &runner).unwrap_err();
        assert!(matches!(err, Error::Wire { ref link, .. } if link == "link0"));
        assert!(!direct[0].busy);
    }

    #[test]
    fn test_plan_is_pure() {
        let recorder = Recorder::new();
        let runner = Runner::new(&recorder, false);
        let (nss, direct, bridges) = build(
            &runner,
            vec![
                NamespaceConfig::new("ns-a").device("link0", "10.0.0.1/24"),
                NamespaceConfig::new("ns-b").device("link0", "10.0.0.2/24"),
            ],
            vec![LinkConfig::new("link0", LinkMode::DirectLink)],
        );
        recorder.clear();

        let plan = plan(&nss, &direct, &bridges).unwrap();
        assert_eq!(
            plan,
            vec![Wiring::Direct {
                link: "link0".into(),
                left: 0,
                right: 1
            }]
        );
        assert!(recorder.issued().is_empty());
    }
}
