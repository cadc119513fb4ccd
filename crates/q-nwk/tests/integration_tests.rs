// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integration tests for q-nwk
//!
//! Several engines are wired together through a mock MAC that answers every
//! request immediately and carries frames between devices that can hear
//! each other. Time only moves when a test advances it.

mod harness {
    use std::collections::VecDeque;

    use q_common::config::TxDelays;
    use q_common::constants::BEACON_PAYLOAD_LEN;
    use q_common::{
        CapabilityInfo, ChannelMask, ExtAddr, ExtPanId, Instant, NwkConfig, PanId, ShortAddr,
    };
    use q_hal::SoftwareRng;
    use q_nwk::command::NetworkStatusCode;
    use q_nwk::frame::{build_frame, FrameBuf};
    use q_nwk::mac::{
        AssociateRequest, AssociateResponse, ChannelEnergy, OrphanResponse, PollRequest, RxEnableRequest,
        ScanConfirm, ScanRequest, ScanType, StartRequest,
    };
    use q_nwk::{
        BeaconNotify, DiscoveryRequest, FormationRequest, FrameType, JoinMethod, JoinRequest, MacConfirm,
        MacDataIndication, MacDataRequest, MacIndication, MacService, MacStatus, MacUser, NoSecurity, Nwk,
        NwkCommand, NwkConfirm, NwkHeader, NwkIndication, PanDescriptor, PermitJoiningRequest, PibAttribute,
        PibId, RequestHandle, SecurityProvider, StartRouterRequest, UpperLayer, PERMIT_FOREVER,
    };

    pub const CHANNEL: u8 = 15;
    pub const PAN: PanId = PanId(0x1A2B);
    pub const EPID: ExtPanId = ExtPanId(0x00DE_AD00_BEEF_0001);
    pub const LQI: u8 = 230;

    /// One MAC request as the engine issued it
    #[derive(Debug, Clone)]
    pub enum MacCall {
        Data { dst: ShortAddr, handle: u8, frame: Vec<u8> },
        Set(PibAttribute),
        Scan(ScanRequest),
        Start(StartRequest),
        Associate(AssociateRequest),
        AssociateResponse(AssociateResponse),
        OrphanResponse(OrphanResponse),
        Poll(PollRequest),
        RxEnable(RxEnableRequest),
        Reset,
    }

    /// MAC that queues requests for the network to answer
    #[derive(Debug)]
    pub struct MockMac {
        pub ext: ExtAddr,
        pub short: ShortAddr,
        pub pan_id: PanId,
        pub channel: u8,
        pub permit: bool,
        pub beacon: [u8; BEACON_PAYLOAD_LEN],
        pub started: bool,
        pub outbox: VecDeque<(MacUser, MacCall)>,
        pub history: Vec<(MacUser, MacCall)>,
    }

    impl MockMac {
        fn new(ext: ExtAddr) -> Self {
            Self {
                ext,
                short: ShortAddr::UNASSIGNED,
                pan_id: PanId::BROADCAST,
                channel: 0,
                permit: false,
                beacon: [0; BEACON_PAYLOAD_LEN],
                started: false,
                outbox: VecDeque::new(),
                history: Vec::new(),
            }
        }

        fn push(&mut self, user: MacUser, call: MacCall) {
            self.history.push((user, call.clone()));
            self.outbox.push_back((user, call));
        }
    }

    impl MacService for MockMac {
        fn data_request(&mut self, user: MacUser, request: &MacDataRequest<'_>) {
            let call = MacCall::Data {
                dst: request.dst,
                handle: request.handle,
                frame: request.payload.to_vec(),
            };
            self.push(user, call);
        }

        fn set_request(&mut self, user: MacUser, attribute: PibAttribute) {
            match attribute {
                PibAttribute::ShortAddress(short) => self.short = short,
                PibAttribute::PanId(pan_id) => self.pan_id = pan_id,
                PibAttribute::LogicalChannel(channel) => self.channel = channel,
                PibAttribute::AssociationPermit(permit) => self.permit = permit,
                PibAttribute::BeaconPayload(beacon) => self.beacon = beacon,
                _ => {}
            }
            self.push(user, MacCall::Set(attribute));
        }

        fn get_request(&mut self, id: PibId) -> Option<PibAttribute> {
            match id {
                PibId::ExtendedAddress => Some(PibAttribute::ExtendedAddress(self.ext)),
                PibId::ShortAddress => Some(PibAttribute::ShortAddress(self.short)),
                PibId::PanId => Some(PibAttribute::PanId(self.pan_id)),
                PibId::LogicalChannel => Some(PibAttribute::LogicalChannel(self.channel)),
                _ => None,
            }
        }

        fn scan_request(&mut self, user: MacUser, request: &ScanRequest) {
            self.push(user, MacCall::Scan(*request));
        }

        fn start_request(&mut self, user: MacUser, request: &StartRequest) {
            self.push(user, MacCall::Start(*request));
        }

        fn associate_request(&mut self, user: MacUser, request: &AssociateRequest) {
            self.push(user, MacCall::Associate(*request));
        }

        fn associate_response(&mut self, user: MacUser, response: &AssociateResponse) {
            self.push(user, MacCall::AssociateResponse(*response));
        }

        fn orphan_response(&mut self, user: MacUser, response: &OrphanResponse) {
            self.push(user, MacCall::OrphanResponse(*response));
        }

        fn poll_request(&mut self, user: MacUser, request: &PollRequest) {
            self.push(user, MacCall::Poll(*request));
        }

        fn rx_enable_request(&mut self, user: MacUser, request: &RxEnableRequest) {
            self.push(user, MacCall::RxEnable(*request));
        }

        fn reset_request(&mut self, user: MacUser, set_default_pib: bool) {
            if set_default_pib {
                self.short = ShortAddr::UNASSIGNED;
                self.pan_id = PanId::BROADCAST;
                self.permit = false;
                self.started = false;
            }
            self.push(user, MacCall::Reset);
        }
    }

    /// Upper layer event, copied out of the engine
    #[derive(Debug, Clone)]
    pub enum Event {
        Data { src: ShortAddr, dst: ShortAddr, payload: Vec<u8> },
        Join { short: ShortAddr, ext: ExtAddr, rejoin: bool },
        Leave { device: ExtAddr, short: ShortAddr },
        Status { addr: ShortAddr, code: NetworkStatusCode },
        RouteRecord { src: ShortAddr, relays: Vec<ShortAddr> },
    }

    /// Upper layer that records everything it is told
    #[derive(Debug, Default)]
    pub struct Recorder {
        pub confirms: Vec<(RequestHandle, NwkConfirm)>,
        pub events: Vec<Event>,
    }

    impl UpperLayer for Recorder {
        fn confirm(&mut self, handle: RequestHandle, confirm: NwkConfirm) {
            self.confirms.push((handle, confirm));
        }

        fn indication(&mut self, indication: NwkIndication<'_>) {
            let event = match indication {
                NwkIndication::Data { dst, src, payload, .. } => Event::Data {
                    src,
                    dst,
                    payload: payload.to_vec(),
                },
                NwkIndication::Join {
                    short_addr,
                    ext_addr,
                    rejoin,
                    ..
                } => Event::Join {
                    short: short_addr,
                    ext: ext_addr,
                    rejoin,
                },
                NwkIndication::Leave { device, short_addr, .. } => Event::Leave {
                    device,
                    short: short_addr,
                },
                NwkIndication::NwkStatus { addr, code } => Event::Status { addr, code },
                NwkIndication::RouteRecord { src, relays } => Event::RouteRecord {
                    src,
                    relays: relays.to_vec(),
                },
            };
            self.events.push(event);
        }
    }

    pub type Engine<S = NoSecurity> = Nwk<MockMac, S, Recorder, SoftwareRng>;

    /// Test configuration: tree addressing, no transmit delays, no link status
    pub fn config(base: NwkConfig) -> NwkConfig {
        let mut config = base.with_tree(6, 4, 3);
        config.tx_delays = TxDelays::NONE;
        config.link_status_period_ms = 0;
        config
    }

    /// Devices plus who hears whom
    pub struct Net<S: SecurityProvider = NoSecurity> {
        pub nodes: Vec<Engine<S>>,
        links: Vec<(usize, usize)>,
        now: u32,
        security: S,
    }

    impl Net {
        pub fn new() -> Self {
            Self::with_security(NoSecurity)
        }
    }

    impl<S: SecurityProvider + Clone> Net<S> {
        /// Network whose nodes all use a copy of `security`
        pub fn with_security(security: S) -> Self {
            Self {
                nodes: Vec::new(),
                links: Vec::new(),
                now: 0,
                security,
            }
        }

        pub fn add(&mut self, config: NwkConfig, ext: u64) -> usize {
            let mac = MockMac::new(ExtAddr(ext));
            let security = self.security.clone();
            let nwk = Nwk::new(config, mac, security, Recorder::default(), SoftwareRng::new(ext)).unwrap();
            self.nodes.push(nwk);
            self.nodes.len() - 1
        }

        pub fn link(&mut self, a: usize, b: usize) {
            self.links.push((a.min(b), a.max(b)));
        }

        /// `a` and `b` stop hearing each other
        pub fn unlink(&mut self, a: usize, b: usize) {
            self.links.retain(|&l| l != (a.min(b), a.max(b)));
        }

        /// Hand node `i` a NWK frame as if `prev_hop` had just sent it, then settle
        pub fn inject(&mut self, i: usize, prev_hop: ShortAddr, lqi: u8, header: &NwkHeader, payload: &[u8]) {
            let frame = build_frame(header, payload).unwrap();
            let dst = if header.dst.is_broadcast() {
                ShortAddr::ALL_DEVICES
            } else {
                self.nodes[i].mac().short
            };
            let data = MacDataIndication {
                src: prev_hop,
                dst,
                lqi,
                payload: &frame,
            };
            self.nodes[i].mac_indication(MacIndication::Data(data));
            self.pump();
        }

        pub fn inject_command(&mut self, i: usize, prev_hop: ShortAddr, lqi: u8, header: &NwkHeader, command: &NwkCommand) {
            let mut payload = FrameBuf::new();
            command.encode(&mut payload).unwrap();
            self.inject(i, prev_hop, lqi, header, &payload);
        }

        fn hearers(&self, of: usize) -> Vec<usize> {
            (0..self.nodes.len())
                .filter(|&j| j != of && self.links.contains(&(of.min(j), of.max(j))))
                .collect()
        }

        /// Run every engine and answer MAC requests until nothing moves
        pub fn pump(&mut self) {
            for _ in 0..1000 {
                let mut busy = false;
                for node in &mut self.nodes {
                    let mut budget = 10_000;
                    while node.has_pending_work() {
                        node.run_once();
                        busy = true;
                        budget -= 1;
                        assert!(budget > 0, "engine keeps rescheduling itself");
                    }
                }
                for i in 0..self.nodes.len() {
                    while let Some((user, call)) = self.nodes[i].mac_mut().outbox.pop_front() {
                        busy = true;
                        self.answer(i, user, call);
                    }
                }
                if !busy {
                    return;
                }
            }
            panic!("network did not settle");
        }

        /// Move the clock forward and let timers fire
        pub fn advance(&mut self, ms: u32) {
            self.now += ms;
            let now = Instant::from_millis(self.now);
            for node in &mut self.nodes {
                node.tick(now);
            }
            self.pump();
        }

        fn answer(&mut self, i: usize, user: MacUser, call: MacCall) {
            match call {
                MacCall::Data { dst, handle, frame } => {
                    let src = self.nodes[i].mac().short;
                    let mut delivered = false;
                    for j in self.hearers(i) {
                        if dst == ShortAddr::ALL_DEVICES || self.nodes[j].mac().short == dst {
                            let data = MacDataIndication {
                                src,
                                dst,
                                lqi: LQI,
                                payload: &frame,
                            };
                            self.nodes[j].mac_indication(MacIndication::Data(data));
                            delivered = true;
                        }
                    }
                    let status = if dst == ShortAddr::ALL_DEVICES || delivered {
                        MacStatus::SUCCESS
                    } else {
                        MacStatus::NO_ACK
                    };
                    self.nodes[i].mac_confirm(user, MacConfirm::Data { handle, status });
                }
                MacCall::Set(_) => {
                    let status = MacStatus::SUCCESS;
                    self.nodes[i].mac_confirm(user, MacConfirm::Set { status });
                }
                MacCall::Scan(request) => self.scan(i, user, &request),
                MacCall::Start(request) => {
                    let mac = self.nodes[i].mac_mut();
                    mac.started = true;
                    mac.pan_id = request.pan_id;
                    mac.channel = request.channel;
                    let status = MacStatus::SUCCESS;
                    self.nodes[i].mac_confirm(user, MacConfirm::Start { status });
                }
                MacCall::Associate(request) => {
                    let device = self.nodes[i].mac().ext;
                    let parent = self.hearers(i).into_iter().find(|&j| {
                        let mac = self.nodes[j].mac();
                        mac.started && mac.short == request.coord
                    });
                    match parent {
                        Some(j) => {
                            let indication = MacIndication::Associate {
                                device,
                                capability: request.capability,
                            };
                            self.nodes[j].mac_indication(indication);
                        }
                        None => {
                            let confirm = MacConfirm::Associate {
                                status: MacStatus::NO_ACK,
                                short_addr: ShortAddr::UNASSIGNED,
                            };
                            self.nodes[i].mac_confirm(user, confirm);
                        }
                    }
                }
                MacCall::AssociateResponse(response) => {
                    if let Some(k) = self.index_of(response.device) {
                        if response.status.is_success() {
                            self.nodes[k].mac_mut().short = response.short_addr;
                        }
                        let confirm = MacConfirm::Associate {
                            status: response.status,
                            short_addr: response.short_addr,
                        };
                        self.nodes[k].mac_confirm(MacUser::Join, confirm);
                    }
                    let confirm = MacConfirm::CommStatus {
                        device: response.device,
                        status: MacStatus::SUCCESS,
                    };
                    self.nodes[i].mac_confirm(user, confirm);
                }
                MacCall::OrphanResponse(response) => {
                    let confirm = MacConfirm::CommStatus {
                        device: response.device,
                        status: MacStatus::SUCCESS,
                    };
                    self.nodes[i].mac_confirm(user, confirm);
                }
                MacCall::Poll(_) => {
                    let status = MacStatus::NO_DATA;
                    self.nodes[i].mac_confirm(user, MacConfirm::Poll { status });
                }
                MacCall::RxEnable(_) => {
                    let status = MacStatus::SUCCESS;
                    self.nodes[i].mac_confirm(user, MacConfirm::RxEnable { status });
                }
                MacCall::Reset => {
                    let status = MacStatus::SUCCESS;
                    self.nodes[i].mac_confirm(user, MacConfirm::Reset { status });
                }
            }
        }

        fn scan(&mut self, i: usize, user: MacUser, request: &ScanRequest) {
            let mut energy = heapless::Vec::new();
            let mut heard = false;
            match request.scan_type {
                ScanType::Ed => {
                    for channel in request.channels.channels() {
                        let _ = energy.push(ChannelEnergy { channel, energy: 0 });
                    }
                }
                ScanType::Active => {
                    for j in self.hearers(i) {
                        let mac = self.nodes[j].mac();
                        if !mac.started || !request.channels.contains(mac.channel) {
                            continue;
                        }
                        let notify = BeaconNotify {
                            descriptor: PanDescriptor {
                                coord_addr: mac.short,
                                coord_ext: mac.ext,
                                pan_id: mac.pan_id,
                                channel: mac.channel,
                                lqi: LQI,
                                association_permit: mac.permit,
                            },
                            sdu: heapless::Vec::from_slice(&mac.beacon).unwrap(),
                        };
                        self.nodes[i].mac_indication(MacIndication::BeaconNotify(notify));
                        heard = true;
                    }
                }
                ScanType::Passive | ScanType::Orphan => {}
            }
            let status = if request.scan_type == ScanType::Ed || heard {
                MacStatus::SUCCESS
            } else {
                MacStatus::NO_BEACON
            };
            let confirm = ScanConfirm {
                status,
                scan_type: request.scan_type,
                unscanned: ChannelMask::EMPTY,
                energy,
                realignment: None,
            };
            self.nodes[i].mac_confirm(user, MacConfirm::Scan(confirm));
        }

        fn index_of(&self, ext: ExtAddr) -> Option<usize> {
            self.nodes.iter().position(|n| n.mac().ext == ext)
        }

        // ====================================================================
        // Scenario steps
        // ====================================================================

        /// Form a network on `CHANNEL` and open it for joining
        pub fn form(&mut self, i: usize) {
            let request = FormationRequest {
                channels: ChannelMask::single(CHANNEL),
                scan_duration: 3,
                pan_id: Some(PAN),
                ext_pan_id: EPID,
            };
            self.nodes[i].formation_request(RequestHandle(100), request).unwrap();
            self.pump();
            self.permit(i);
        }

        pub fn permit(&mut self, i: usize) {
            self.set_permit(i, PERMIT_FOREVER);
        }

        pub fn permit_off(&mut self, i: usize) {
            self.set_permit(i, 0);
        }

        fn set_permit(&mut self, i: usize, duration_s: u8) {
            let request = PermitJoiningRequest { duration_s };
            self.nodes[i].permit_joining_request(RequestHandle(101), request).unwrap();
            self.pump();
        }

        /// Discover and associate as a router; returns the join confirm
        pub fn associate(&mut self, i: usize) -> NwkConfirm {
            let discovery = DiscoveryRequest {
                channels: ChannelMask::single(CHANNEL),
                scan_duration: 3,
            };
            self.nodes[i].discovery_request(RequestHandle(200), discovery).unwrap();
            self.pump();
            let join = JoinRequest {
                method: JoinMethod::Association,
                ext_pan_id: EPID,
                channels: ChannelMask::single(CHANNEL),
                scan_duration: 3,
                capability: CapabilityInfo::router(),
            };
            self.nodes[i].join_request(RequestHandle(201), join).unwrap();
            self.pump();
            self.confirm_for(i, RequestHandle(201)).expect("join confirmed")
        }

        /// Start routing and accept children
        pub fn open_router(&mut self, i: usize) {
            self.nodes[i]
                .start_router_request(RequestHandle(300), StartRouterRequest)
                .unwrap();
            self.pump();
            self.permit(i);
        }

        pub fn confirm_for(&self, i: usize, handle: RequestHandle) -> Option<NwkConfirm> {
            self.nodes[i]
                .upper()
                .confirms
                .iter()
                .rev()
                .find(|(h, _)| *h == handle)
                .map(|(_, c)| c.clone())
        }

        pub fn events(&self, i: usize) -> &[Event] {
            &self.nodes[i].upper().events
        }

        /// NWK commands node `i` handed to its MAC
        pub fn sent_commands(&self, i: usize) -> Vec<(NwkHeader, NwkCommand)> {
            self.nodes[i]
                .mac()
                .history
                .iter()
                .filter_map(|(_, call)| match call {
                    MacCall::Data { frame, .. } => Some(frame),
                    _ => None,
                })
                .filter_map(|frame| {
                    let (header, len) = NwkHeader::decode(frame).ok()?;
                    if header.frame_type != FrameType::Command {
                        return None;
                    }
                    let command = NwkCommand::decode(&frame[len..]).ok()?;
                    Some((header, command))
                })
                .collect()
        }
    }

    /// Coordinator A and router B, B joined by association
    pub fn pair() -> Net {
        let mut net = Net::new();
        let a = net.add(config(NwkConfig::coordinator()), 0xA0A0_0000_0000_0001);
        let b = net.add(config(NwkConfig::router()), 0xB0B0_0000_0000_0002);
        net.link(a, b);
        net.form(a);
        net.associate(b);
        net
    }

    /// A - B - C in a line: A and C cannot hear each other
    pub fn line() -> Net {
        let mut net = pair();
        let c = net.add(config(NwkConfig::router()), 0xC0C0_0000_0000_0003);
        net.link(1, c);
        net.open_router(1);
        net.associate(c);
        net
    }
}

mod formation_tests {
    use super::harness::{config, Net, MacCall, CHANNEL, EPID, PAN};
    use q_common::{ChannelMask, ExtPanId, NwkConfig, ShortAddr};
    use q_nwk::mac::ScanType;
    use q_nwk::{FormationRequest, MacUser, NwkConfirm, NwkStatus, PibAttribute, RequestHandle};

    #[test]
    fn test_coordinator_forms_network() {
        let mut net = Net::new();
        let a = net.add(config(NwkConfig::coordinator()), 0x11);
        net.form(a);

        let nwk = &net.nodes[a];
        assert_eq!(
            net.confirm_for(a, RequestHandle(100)),
            Some(NwkConfirm::Formation {
                status: NwkStatus::Success
            })
        );
        assert!(nwk.nib().joined);
        assert_eq!(nwk.nib().short_addr(), ShortAddr::COORDINATOR);
        assert_eq!(nwk.nib().pib.pan_id, PAN);
        assert_eq!(nwk.nib().pib.channel, CHANNEL);
        assert_eq!(nwk.nib().ext_pan_id, EPID);
        assert!(nwk.nib().permit_joining);

        let history = &nwk.mac().history;
        // A single channel needs no energy scan
        assert!(history
            .iter()
            .all(|(_, c)| !matches!(c, MacCall::Scan(s) if s.scan_type == ScanType::Ed)));
        assert!(history
            .iter()
            .any(|(u, c)| *u == MacUser::Formation && matches!(c, MacCall::Start(s) if s.pan_coordinator)));
        assert!(history
            .iter()
            .any(|(_, c)| matches!(c, MacCall::Set(PibAttribute::ShortAddress(ShortAddr::COORDINATOR)))));
    }

    #[test]
    fn test_energy_scan_picks_quietest_channel() {
        let mut net = Net::new();
        let a = net.add(config(NwkConfig::coordinator()), 0x12);
        let request = FormationRequest {
            channels: ChannelMask((1 << 11) | (1 << 12)),
            scan_duration: 3,
            pan_id: Some(PAN),
            ext_pan_id: ExtPanId::ANY,
        };
        net.nodes[a].formation_request(RequestHandle(1), request).unwrap();
        net.pump();

        let nwk = &net.nodes[a];
        let scans: Vec<ScanType> = nwk
            .mac()
            .history
            .iter()
            .filter_map(|(_, c)| match c {
                MacCall::Scan(s) => Some(s.scan_type),
                _ => None,
            })
            .collect();
        assert_eq!(scans, vec![ScanType::Ed, ScanType::Active]);
        assert_eq!(nwk.nib().pib.channel, 11);
        // Unspecified extended PAN id falls back to our IEEE address
        assert_eq!(nwk.nib().ext_pan_id, ExtPanId(0x12));
    }

    #[test]
    fn test_router_cannot_form() {
        let mut net = Net::new();
        let r = net.add(config(NwkConfig::router()), 0x13);
        net.form(r);
        assert_eq!(
            net.confirm_for(r, RequestHandle(100)),
            Some(NwkConfirm::Formation {
                status: NwkStatus::InvalidRequest
            })
        );
        assert!(!net.nodes[r].nib().joined);
    }

    #[test]
    fn test_requests_run_one_at_a_time() {
        let mut net = Net::new();
        let a = net.add(config(NwkConfig::coordinator()), 0x14);
        let request = FormationRequest {
            channels: ChannelMask::single(CHANNEL),
            scan_duration: 3,
            pan_id: Some(PAN),
            ext_pan_id: EPID,
        };
        net.nodes[a].formation_request(RequestHandle(1), request).unwrap();
        net.nodes[a].formation_request(RequestHandle(2), request).unwrap();
        net.pump();

        let confirms = &net.nodes[a].upper().confirms;
        assert_eq!(confirms.len(), 2);
        assert_eq!(confirms[0].0, RequestHandle(1));
        assert_eq!(confirms[0].1.status(), NwkStatus::Success);
        // The second request only began once the first had formed the network
        assert_eq!(confirms[1].0, RequestHandle(2));
        assert_eq!(confirms[1].1.status(), NwkStatus::InvalidRequest);
        let starts = net.nodes[a]
            .mac()
            .history
            .iter()
            .filter(|(_, c)| matches!(c, MacCall::Start(_)))
            .count();
        assert_eq!(starts, 1);
    }
}

mod join_tests {
    use super::harness::{config, line, pair, Event, Net, CHANNEL, EPID};
    use q_common::{CapabilityInfo, ExtAddr, NwkConfig, Relationship, ShortAddr};
    use q_nwk::{DirectJoinRequest, NwkConfirm, NwkStatus, RequestHandle};
    use std::collections::HashSet;

    #[test]
    fn test_router_associates_with_coordinator() {
        let net = pair();

        match net.confirm_for(1, RequestHandle(200)) {
            Some(NwkConfirm::Discovery { status, networks }) => {
                assert_eq!(status, NwkStatus::Success);
                assert_eq!(networks.len(), 1);
                assert_eq!(networks[0].ext_pan_id, EPID);
                assert!(networks[0].permit_joining);
                assert!(networks[0].router_capacity);
            }
            other => panic!("unexpected discovery confirm {other:?}"),
        }
        assert_eq!(
            net.confirm_for(1, RequestHandle(201)),
            Some(NwkConfirm::Join {
                status: NwkStatus::Success,
                short_addr: ShortAddr(0x0001),
                ext_pan_id: EPID,
                channel: CHANNEL,
            })
        );

        let b = &net.nodes[1];
        assert!(b.nib().joined);
        assert_eq!(b.nib().depth, 1);
        assert_eq!(b.neighbors().parent().map(|p| p.short), Some(ShortAddr::COORDINATOR));

        let a = &net.nodes[0];
        let child = a.neighbors().find_short(ShortAddr(0x0001)).unwrap();
        assert_eq!(child.relationship, Relationship::Child);
        assert_eq!(child.ext, b.nib().ext_addr());
        assert!(net.events(0).iter().any(|e| matches!(
            e,
            Event::Join { short, rejoin: false, .. } if *short == ShortAddr(0x0001)
        )));
    }

    #[test]
    fn test_second_router_gets_next_tree_block() {
        let mut net = pair();
        let c = net.add(config(NwkConfig::router()), 0xC1);
        net.link(0, c);
        let confirm = net.associate(c);
        // Cskip(0) = 31 for Cm = 6, Rm = 4, Lm = 3
        assert_eq!(
            confirm,
            NwkConfirm::Join {
                status: NwkStatus::Success,
                short_addr: ShortAddr(0x0020),
                ext_pan_id: EPID,
                channel: CHANNEL,
            }
        );
    }

    #[test]
    fn test_depth_two_siblings_share_parent_block() {
        let mut net = line();
        let b = 1;
        let b_addr = net.nodes[b].nib().short_addr();
        let mut routers = vec![net.nodes[2].nib().short_addr()];
        for ext in [0xE1E1_0000_0000_0005, 0xE2E2_0000_0000_0006] {
            let r = net.add(config(NwkConfig::router()), ext);
            net.link(b, r);
            match net.associate(r) {
                NwkConfirm::Join { status, short_addr, .. } => {
                    assert_eq!(status, NwkStatus::Success);
                    routers.push(short_addr);
                }
                other => panic!("unexpected join confirm {other:?}"),
            }
            assert_eq!(net.nodes[r].nib().depth, 2);
        }
        // Cskip(1) = 7: router blocks start at B + 1 + 7k
        assert_eq!(routers, vec![ShortAddr(0x0002), ShortAddr(0x0009), ShortAddr(0x0010)]);

        let request = DirectJoinRequest {
            device: ExtAddr(0xED02),
            capability: CapabilityInfo::rx_on_end_device(),
        };
        net.nodes[b].direct_join_request(RequestHandle(2), request).unwrap();
        net.pump();
        let end_device = net.nodes[b].neighbors().find_ext(ExtAddr(0xED02)).unwrap().short;
        assert_eq!(end_device, ShortAddr(0x001E));

        let own_block = net.nodes[0].allocator().cskip_block(ShortAddr::COORDINATOR, 0, 1).unwrap();
        assert_eq!(own_block.start, b_addr);
        let allocator = net.nodes[b].allocator();
        let blocks: Vec<_> = (1..=3).map(|n| allocator.cskip_block(b_addr, 1, n).unwrap()).collect();
        for (block, addr) in blocks.iter().zip(&routers) {
            assert_eq!(block.start, *addr);
            assert!(own_block.contains(block.start));
            assert!(own_block.contains(ShortAddr(block.start.0 + block.size - 1)));
            assert!(!block.contains(end_device));
        }
        assert!(!blocks[0].overlaps(&blocks[1]));
        assert!(!blocks[1].overlaps(&blocks[2]));
        assert!(own_block.contains(end_device));

        let unique: HashSet<u16> = routers.iter().chain([&end_device]).map(|a| a.0).collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_join_refused_without_permit() {
        let mut net = Net::new();
        let a = net.add(config(NwkConfig::coordinator()), 0xA1);
        let b = net.add(config(NwkConfig::router()), 0xB1);
        net.link(a, b);
        net.form(a);
        net.permit_off(a);

        let confirm = net.associate(b);
        assert_eq!(confirm.status(), NwkStatus::NotPermitted);
        assert!(!net.nodes[b].nib().joined);
        assert!(net.nodes[a].neighbors().iter().all(|n| n.relationship != Relationship::Child));
    }

    #[test]
    fn test_direct_join_rejects_known_device() {
        let mut net = Net::new();
        let a = net.add(config(NwkConfig::coordinator()), 0xA2);
        net.form(a);
        let request = DirectJoinRequest {
            device: ExtAddr(0x5555),
            capability: CapabilityInfo::rx_on_end_device(),
        };
        net.nodes[a].direct_join_request(RequestHandle(1), request).unwrap();
        net.nodes[a].direct_join_request(RequestHandle(2), request).unwrap();
        net.pump();

        assert_eq!(net.confirm_for(a, RequestHandle(1)).map(|c| c.status()), Some(NwkStatus::Success));
        assert_eq!(
            net.confirm_for(a, RequestHandle(2)).map(|c| c.status()),
            Some(NwkStatus::AlreadyPresent)
        );
        let child = net.nodes[a].neighbors().find_ext(ExtAddr(0x5555)).unwrap();
        assert_eq!(child.relationship, Relationship::Child);
        assert_eq!(net.nodes[a].address_map().ext_of(child.short), Some(ExtAddr(0x5555)));
    }

    #[test]
    fn test_every_request_confirmed_once() {
        let net = pair();
        for node in &net.nodes {
            let handles: Vec<RequestHandle> = node.upper().confirms.iter().map(|(h, _)| *h).collect();
            let unique: HashSet<u16> = handles.iter().map(|h| h.0).collect();
            assert_eq!(unique.len(), handles.len());
            assert!(handles.iter().all(|h| !h.is_internal()));
        }
    }
}

mod routing_tests {
    use super::harness::{config, line, pair, Event, Net, LQI};
    use q_common::constants::{INITIAL_RREQ_RETRIES, ROUTE_DISCOVERY_TIME_MS, RREQ_RETRIES};
    use q_common::{Error, NwkConfig, ShortAddr};
    use q_nwk::command::{ManyToOne, RouteRequest};
    use q_nwk::{
        DataRequest, DiscoveryMode, NwkCommand, NwkConfirm, NwkHeader, NwkStatus, RequestHandle,
        RouteDiscoveryRequest, RouteStatus,
    };

    const A: ShortAddr = ShortAddr(0x0000);
    const B: ShortAddr = ShortAddr(0x0001);
    const C: ShortAddr = ShortAddr(0x0002);

    fn send_c_to_a(net: &mut Net) {
        let request = DataRequest {
            dst: A,
            radius: 0,
            discover_route: true,
            security: false,
            multicast: false,
            payload: b"ping",
        };
        net.nodes[2].data_request(RequestHandle(7), &request).unwrap();
        net.pump();
    }

    #[test]
    fn test_line_addresses() {
        let net = line();
        assert_eq!(net.nodes[1].nib().short_addr(), B);
        assert_eq!(net.nodes[2].nib().short_addr(), C);
        assert_eq!(net.nodes[2].nib().depth, 2);
    }

    #[test]
    fn test_data_discovers_mesh_route() {
        let mut net = line();
        send_c_to_a(&mut net);

        assert_eq!(
            net.confirm_for(2, RequestHandle(7)),
            Some(NwkConfirm::Data {
                status: NwkStatus::Success
            })
        );
        assert!(net.events(0).iter().any(|e| matches!(
            e,
            Event::Data { src, dst, payload } if *src == C && *dst == A && payload.as_slice() == b"ping"
        )));

        let to_a = net.nodes[2].routes().find(A).unwrap();
        assert_eq!(to_a.status, RouteStatus::Active);
        assert_eq!(to_a.next_hop, B);
        let to_c = net.nodes[0].routes().find(C).unwrap();
        assert_eq!(to_c.next_hop, B);
        assert_eq!(net.nodes[1].routes().find(A).map(|r| r.next_hop), Some(A));
    }

    #[test]
    fn test_route_request_answered_once() {
        let mut net = line();
        send_c_to_a(&mut net);

        let requests = net
            .sent_commands(2)
            .into_iter()
            .filter(|(_, cmd)| matches!(cmd, NwkCommand::RouteRequest(r) if r.dst == A))
            .count();
        assert_eq!(requests, 1 + usize::from(INITIAL_RREQ_RETRIES));

        let replies: Vec<_> = net
            .sent_commands(0)
            .into_iter()
            .filter_map(|(h, cmd)| match cmd {
                NwkCommand::RouteReply(r) => Some((h, r)),
                _ => None,
            })
            .collect();
        assert_eq!(replies.len(), 1);
        let (header, reply) = &replies[0];
        // Replies travel hop by hop
        assert_eq!(header.dst, B);
        assert_eq!(reply.originator, C);
        assert_eq!(reply.responder, A);
    }

    /// Route requests `node` put on the air for discovery `(originator, id)`
    fn relayed_requests(net: &Net, node: usize, originator: ShortAddr, id: u8) -> usize {
        net.sent_commands(node)
            .into_iter()
            .filter(|(h, cmd)| h.src == originator && matches!(cmd, NwkCommand::RouteRequest(r) if r.id == id))
            .count()
    }

    #[test]
    fn test_route_request_relayed_once_in_diamond() {
        // A hears C's request through both B and D
        let mut net = Net::new();
        let a = net.add(config(NwkConfig::coordinator()), 0xA5);
        let b = net.add(config(NwkConfig::router()), 0xB5);
        let d = net.add(config(NwkConfig::router()), 0xD5);
        let c = net.add(config(NwkConfig::router()), 0xC5);
        net.link(a, b);
        net.link(a, d);
        net.link(b, c);
        net.link(d, c);
        net.form(a);
        net.associate(b);
        net.associate(d);
        net.open_router(b);
        net.associate(c);
        assert_eq!(net.nodes[c].nib().short_addr(), C);

        let request = RouteDiscoveryRequest {
            mode: DiscoveryMode::Unicast(ShortAddr(0x0042)),
            radius: 0,
            no_route_cache: false,
        };
        net.nodes[c].route_discovery_request(RequestHandle(9), request).unwrap();
        net.pump();

        let id = net.nodes[c].discoveries().iter().find(|e| e.originator == C).unwrap().id;
        for relay in [b, d] {
            assert_eq!(relayed_requests(&net, relay, C, id), 1 + usize::from(RREQ_RETRIES));
        }
        // Two copies arrived at A, one relay went out
        assert_eq!(relayed_requests(&net, a, C, id), 1 + usize::from(RREQ_RETRIES));
        let entries = net.nodes[a].discoveries().iter().filter(|e| e.originator == C).count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_cheaper_request_copy_replaces_cost() {
        let mut net = pair();
        let originator = ShortAddr(0x0077);
        let far = ShortAddr(0x0033);
        let header = NwkHeader::command(ShortAddr::ALL_ROUTERS, originator, 5, 40);
        let rreq = RouteRequest {
            many_to_one: ManyToOne::No,
            multicast: false,
            id: 5,
            dst: ShortAddr(0x0042),
            path_cost: 20,
            dst_ext: None,
        };

        net.inject_command(0, far, 60, &header, &NwkCommand::RouteRequest(rreq));
        let entry = *net.nodes[0].discoveries().find(originator, 5).unwrap();
        assert_eq!(entry.sender, far);
        let first_cost = entry.forward_cost;
        assert_eq!(relayed_requests(&net, 0, originator, 5), 1 + usize::from(RREQ_RETRIES));

        let cheaper = RouteRequest { path_cost: 0, ..rreq };
        net.inject_command(0, B, LQI, &header, &NwkCommand::RouteRequest(cheaper));
        let entry = *net.nodes[0].discoveries().find(originator, 5).unwrap();
        assert_eq!(entry.sender, B);
        assert!(entry.forward_cost < first_cost);
        let best_cost = entry.forward_cost;

        // A dearer copy changes nothing
        let dearer = RouteRequest { path_cost: 10, ..rreq };
        net.inject_command(0, far, 60, &header, &NwkCommand::RouteRequest(dearer));
        let entry = *net.nodes[0].discoveries().find(originator, 5).unwrap();
        assert_eq!(entry.sender, B);
        assert_eq!(entry.forward_cost, best_cost);

        assert_eq!(relayed_requests(&net, 0, originator, 5), 1 + usize::from(RREQ_RETRIES));
    }

    #[test]
    fn test_route_discovery_times_out() {
        let mut net = Net::new();
        let a = net.add(config(NwkConfig::coordinator()), 0xA3);
        net.form(a);
        let lost = ShortAddr(0x0042);
        let request = RouteDiscoveryRequest {
            mode: DiscoveryMode::Unicast(lost),
            radius: 0,
            no_route_cache: false,
        };
        net.nodes[a].route_discovery_request(RequestHandle(9), request).unwrap();
        net.pump();
        assert_eq!(net.confirm_for(a, RequestHandle(9)), None);
        assert_eq!(
            net.nodes[a].routes().find(lost).map(|r| r.status),
            Some(RouteStatus::DiscoveryUnderway)
        );

        net.advance(ROUTE_DISCOVERY_TIME_MS + 1);
        assert_eq!(
            net.confirm_for(a, RequestHandle(9)),
            Some(NwkConfirm::RouteDiscovery {
                status: NwkStatus::RouteDiscoveryFailed
            })
        );
        assert_eq!(
            net.nodes[a].routes().find(lost).map(|r| r.status),
            Some(RouteStatus::DiscoveryFailed)
        );
    }

    #[test]
    fn test_route_discovery_argument_checks() {
        let mut net = Net::new();
        let a = net.add(config(NwkConfig::coordinator()), 0xA4);
        net.form(a);

        let broadcast = RouteDiscoveryRequest {
            mode: DiscoveryMode::Unicast(ShortAddr::ALL_ROUTERS),
            radius: 0,
            no_route_cache: false,
        };
        assert_eq!(
            net.nodes[a].route_discovery_request(RequestHandle(1), broadcast),
            Err(Error::InvalidParameter)
        );

        let to_self = RouteDiscoveryRequest {
            mode: DiscoveryMode::Unicast(A),
            ..broadcast
        };
        net.nodes[a].route_discovery_request(RequestHandle(2), to_self).unwrap();
        // Not a concentrator
        let many_to_one = RouteDiscoveryRequest {
            mode: DiscoveryMode::ManyToOne,
            ..broadcast
        };
        net.nodes[a].route_discovery_request(RequestHandle(3), many_to_one).unwrap();
        net.pump();

        for handle in [RequestHandle(2), RequestHandle(3)] {
            assert_eq!(
                net.confirm_for(a, handle),
                Some(NwkConfirm::RouteDiscovery {
                    status: NwkStatus::InvalidRequest
                })
            );
        }
    }

    #[test]
    fn test_data_before_join_is_refused() {
        let mut net = Net::new();
        let r = net.add(config(NwkConfig::router()), 0xD1);
        let request = DataRequest {
            dst: A,
            radius: 0,
            discover_route: false,
            security: false,
            multicast: false,
            payload: &[1, 2, 3],
        };
        net.nodes[r].data_request(RequestHandle(5), &request).unwrap();
        net.pump();
        assert_eq!(
            net.confirm_for(r, RequestHandle(5)),
            Some(NwkConfirm::Data {
                status: NwkStatus::InvalidRequest
            })
        );
        assert!(net.nodes[r].mac().history.is_empty());
    }

    #[test]
    fn test_broadcast_data_reaches_neighbors() {
        let mut net = line();
        let request = DataRequest {
            dst: ShortAddr::ALL_DEVICES,
            radius: 0,
            discover_route: false,
            security: false,
            multicast: false,
            payload: b"all",
        };
        net.nodes[0].data_request(RequestHandle(8), &request).unwrap();
        net.pump();

        assert_eq!(net.confirm_for(0, RequestHandle(8)).map(|c| c.status()), Some(NwkStatus::Success));
        // C only hears B's rebroadcast, and only once
        let copies = net
            .events(2)
            .iter()
            .filter(|e| matches!(e, Event::Data { src, .. } if *src == A))
            .count();
        assert_eq!(copies, 1);
        assert!(net.events(1).iter().any(|e| matches!(e, Event::Data { src, .. } if *src == A)));
    }
}

mod leave_tests {
    use super::harness::{config, line, pair, Event, Net};
    use q_common::{NwkConfig, ShortAddr};
    use q_nwk::{DataRequest, LeaveRequest, NwkConfirm, NwkStatus, RequestHandle};

    #[test]
    fn test_leaving_router_purges_routes() {
        let mut net = line();
        let request = DataRequest {
            dst: ShortAddr(0x0000),
            radius: 0,
            discover_route: true,
            security: false,
            multicast: false,
            payload: b"x",
        };
        net.nodes[2].data_request(RequestHandle(7), &request).unwrap();
        net.pump();
        assert!(net.nodes[0].routes().find(ShortAddr(0x0002)).is_some());

        let leave = LeaveRequest {
            device: None,
            remove_children: false,
            rejoin: false,
        };
        net.nodes[1].leave_request(RequestHandle(40), leave).unwrap();
        net.pump();

        let b_ext = net.nodes[1].mac().ext;
        assert_eq!(
            net.confirm_for(1, RequestHandle(40)),
            Some(NwkConfirm::Leave {
                status: NwkStatus::Success,
                device: None
            })
        );
        assert!(!net.nodes[1].nib().joined);
        assert!(net.nodes[1].routes().iter().next().is_none());

        // Routes through the departed router are gone on both sides
        assert!(net.nodes[0].routes().find(ShortAddr(0x0002)).is_none());
        assert!(net.nodes[2].routes().find(ShortAddr(0x0000)).is_none());
        assert!(net.nodes[0].neighbors().find_short(ShortAddr(0x0001)).is_none());
        assert!(net
            .events(0)
            .iter()
            .any(|e| matches!(e, Event::Leave { device, .. } if *device == b_ext)));
    }

    #[test]
    fn test_parent_removes_child() {
        let mut net = pair();
        let b_ext = net.nodes[1].mac().ext;
        let leave = LeaveRequest {
            device: Some(b_ext),
            remove_children: false,
            rejoin: true,
        };
        net.nodes[0].leave_request(RequestHandle(41), leave).unwrap();
        net.pump();

        assert_eq!(
            net.confirm_for(0, RequestHandle(41)),
            Some(NwkConfirm::Leave {
                status: NwkStatus::Success,
                device: Some(b_ext)
            })
        );
        assert!(net.nodes[0].neighbors().find_ext(b_ext).is_none());
        // The child obeys without confirming anything upward
        assert!(!net.nodes[1].nib().joined);
        assert!(net.nodes[1]
            .upper()
            .confirms
            .iter()
            .all(|(_, c)| !matches!(c, NwkConfirm::Leave { .. })));
        assert!(net
            .events(1)
            .iter()
            .any(|e| matches!(e, Event::Leave { device, .. } if *device == b_ext)));
    }

    #[test]
    fn test_leave_before_join_is_refused() {
        let mut net = Net::new();
        let r = net.add(config(NwkConfig::router()), 0xE1);
        let leave = LeaveRequest {
            device: None,
            remove_children: false,
            rejoin: false,
        };
        net.nodes[r].leave_request(RequestHandle(1), leave).unwrap();
        net.pump();
        assert_eq!(
            net.confirm_for(r, RequestHandle(1)).map(|c| c.status()),
            Some(NwkStatus::InvalidRequest)
        );
    }
}

mod service_tests {
    use super::harness::{config, pair, MacCall, Net, Recorder, CHANNEL, EPID, PAN};
    use q_common::{CapabilityInfo, ChannelMask, Error, ExtAddr, NwkConfig, ShortAddr};
    use q_hal::SoftwareRng;
    use q_nwk::{
        JoinMethod, JoinRequest, NoSecurity, Nwk, NwkConfirm, NwkSnapshot, NwkStatus, RequestHandle,
        ResetRequest, SilentJoinParams, SyncRequest,
    };

    fn silent_end_device(net: &mut Net) -> usize {
        let d = net.add(config(NwkConfig::end_device()), 0xED);
        let params = SilentJoinParams {
            short_addr: ShortAddr(0x0100),
            pan_id: PAN,
            channel: CHANNEL,
            parent: ShortAddr::COORDINATOR,
            parent_ext: ExtAddr(0xA0),
            depth: 1,
        };
        let request = JoinRequest {
            method: JoinMethod::Silent(params),
            ext_pan_id: EPID,
            channels: ChannelMask::single(CHANNEL),
            scan_duration: 3,
            capability: CapabilityInfo::sleepy_end_device(),
        };
        net.nodes[d].join_request(RequestHandle(1), request).unwrap();
        net.pump();
        d
    }

    #[test]
    fn test_silent_join_sets_state_without_frames() {
        let mut net = Net::new();
        let d = silent_end_device(&mut net);
        let nwk = &net.nodes[d];
        assert_eq!(net.confirm_for(d, RequestHandle(1)).map(|c| c.status()), Some(NwkStatus::Success));
        assert!(nwk.nib().joined);
        assert_eq!(nwk.nib().short_addr(), ShortAddr(0x0100));
        assert_eq!(nwk.neighbors().parent().map(|p| p.short), Some(ShortAddr::COORDINATOR));
        assert!(nwk.mac().history.iter().all(|(_, c)| matches!(c, MacCall::Set(_))));
    }

    #[test]
    fn test_end_device_sync_opens_rx_window() {
        let mut net = Net::new();
        let d = silent_end_device(&mut net);
        net.nodes[d].sync_request(RequestHandle(2), SyncRequest { track: false }).unwrap();
        net.pump();

        assert_eq!(
            net.confirm_for(d, RequestHandle(2)),
            Some(NwkConfirm::Sync {
                status: NwkStatus::Success
            })
        );
        let history = &net.nodes[d].mac().history;
        assert!(history
            .iter()
            .any(|(_, c)| matches!(c, MacCall::Poll(p) if p.coord == ShortAddr::COORDINATOR)));
        assert!(history.iter().any(|(_, c)| matches!(c, MacCall::RxEnable(_))));
    }

    #[test]
    fn test_sync_tracking_rejected() {
        let mut net = Net::new();
        let d = silent_end_device(&mut net);
        assert_eq!(
            net.nodes[d].sync_request(RequestHandle(3), SyncRequest { track: true }),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_router_sync_is_invalid() {
        let mut net = pair();
        net.nodes[1].sync_request(RequestHandle(4), SyncRequest { track: false }).unwrap();
        net.pump();
        assert_eq!(
            net.confirm_for(1, RequestHandle(4)).map(|c| c.status()),
            Some(NwkStatus::InvalidRequest)
        );
    }

    #[test]
    fn test_cold_reset_forgets_network() {
        let mut net = pair();
        net.nodes[0].reset_request(RequestHandle(50), ResetRequest { warm_start: false }).unwrap();
        net.pump();

        assert_eq!(
            net.confirm_for(0, RequestHandle(50)),
            Some(NwkConfirm::Reset {
                status: NwkStatus::Success
            })
        );
        let a = &net.nodes[0];
        assert!(!a.nib().joined);
        assert_eq!(a.neighbors().iter().count(), 0);
        assert_eq!(a.address_map().iter().count(), 0);
    }

    #[test]
    fn test_warm_reset_keeps_network() {
        let mut net = pair();
        net.nodes[0].reset_request(RequestHandle(51), ResetRequest { warm_start: true }).unwrap();
        net.pump();
        assert_eq!(net.confirm_for(0, RequestHandle(51)).map(|c| c.status()), Some(NwkStatus::Success));
        assert!(net.nodes[0].nib().joined);
        assert!(net.nodes[0].neighbors().find_short(ShortAddr(0x0001)).is_some());
    }

    #[test]
    fn test_snapshot_restores_joined_router() {
        let net = pair();
        let b = &net.nodes[1];
        assert!(b.is_dirty());
        let bytes = b.snapshot().to_bytes().unwrap();
        let snapshot = NwkSnapshot::from_bytes(&bytes).unwrap();

        let mut fresh = Net::new();
        let idx = fresh.add(config(NwkConfig::router()), b.mac().ext.0);
        let restored = &mut fresh.nodes[idx];
        restored.restore(&snapshot).unwrap();

        assert!(restored.nib().joined);
        assert_eq!(restored.nib().short_addr(), ShortAddr(0x0001));
        assert_eq!(restored.nib().depth, 1);
        assert_eq!(restored.nib().ext_pan_id, EPID);
        assert_eq!(restored.neighbors().parent().map(|p| p.short), Some(ShortAddr::COORDINATOR));
        assert!(!restored.is_dirty());
    }

    #[test]
    fn test_engine_needs_ieee_address() {
        let engine = Nwk::new(
            config(NwkConfig::router()),
            NullMac,
            NoSecurity,
            Recorder::default(),
            SoftwareRng::new(1),
        );
        assert!(matches!(engine, Err(Error::InvalidState)));
    }

    /// MAC without an IEEE address
    struct NullMac;

    impl q_nwk::MacService for NullMac {
        fn data_request(&mut self, _: q_nwk::MacUser, _: &q_nwk::MacDataRequest<'_>) {}
        fn set_request(&mut self, _: q_nwk::MacUser, _: q_nwk::PibAttribute) {}
        fn get_request(&mut self, _: q_nwk::PibId) -> Option<q_nwk::PibAttribute> {
            None
        }
        fn scan_request(&mut self, _: q_nwk::MacUser, _: &q_nwk::mac::ScanRequest) {}
        fn start_request(&mut self, _: q_nwk::MacUser, _: &q_nwk::mac::StartRequest) {}
        fn associate_request(&mut self, _: q_nwk::MacUser, _: &q_nwk::mac::AssociateRequest) {}
        fn associate_response(&mut self, _: q_nwk::MacUser, _: &q_nwk::mac::AssociateResponse) {}
        fn orphan_response(&mut self, _: q_nwk::MacUser, _: &q_nwk::mac::OrphanResponse) {}
        fn poll_request(&mut self, _: q_nwk::MacUser, _: &q_nwk::mac::PollRequest) {}
        fn rx_enable_request(&mut self, _: q_nwk::MacUser, _: &q_nwk::mac::RxEnableRequest) {}
        fn reset_request(&mut self, _: q_nwk::MacUser, _: bool) {}
    }
}

mod concentrator_tests {
    use super::harness::{config, Event, Net};
    use q_common::constants::INITIAL_RREQ_RETRIES;
    use q_common::{NwkConfig, ShortAddr};
    use q_nwk::command::{ManyToOne, NetworkStatusCode};
    use q_nwk::{
        DataRequest, DiscoveryMode, NwkCommand, NwkConfirm, NwkStatus, RequestHandle, RouteDiscoveryRequest,
        RouteStatus,
    };

    const A: ShortAddr = ShortAddr(0x0000);
    const B: ShortAddr = ShortAddr(0x0001);
    const C: ShortAddr = ShortAddr(0x0002);

    /// Coordinator that only sends many-to-one requests on demand
    fn concentrator(route_record: bool) -> NwkConfig {
        let mut config = config(NwkConfig::coordinator());
        config.concentrator.enabled = true;
        config.concentrator.discovery_time_ms = 0;
        config.concentrator.route_record_required = route_record;
        config
    }

    /// Concentrator A - B - C
    fn concentrator_line(route_record: bool) -> Net {
        let mut net = Net::new();
        let a = net.add(concentrator(route_record), 0xA0A0_0000_0000_0001);
        let b = net.add(config(NwkConfig::router()), 0xB0B0_0000_0000_0002);
        let c = net.add(config(NwkConfig::router()), 0xC0C0_0000_0000_0003);
        net.link(a, b);
        net.link(b, c);
        net.form(a);
        net.associate(b);
        net.open_router(b);
        net.associate(c);
        net
    }

    fn advertise(net: &mut Net, route_record: bool) {
        let request = RouteDiscoveryRequest {
            mode: DiscoveryMode::ManyToOne,
            radius: 0,
            no_route_cache: !route_record,
        };
        net.nodes[0].route_discovery_request(RequestHandle(60), request).unwrap();
        net.pump();
    }

    fn many_to_one_requests(net: &Net) -> usize {
        net.sent_commands(0)
            .into_iter()
            .filter(|(h, cmd)| {
                h.src == A && matches!(cmd, NwkCommand::RouteRequest(r) if r.many_to_one != ManyToOne::No)
            })
            .count()
    }

    fn send_to_concentrator(net: &mut Net, from: usize, payload: &'static [u8]) {
        let request = DataRequest {
            dst: A,
            radius: 0,
            discover_route: true,
            security: false,
            multicast: false,
            payload,
        };
        net.nodes[from].data_request(RequestHandle(61), &request).unwrap();
        net.pump();
    }

    #[test]
    fn test_many_to_one_builds_reverse_routes() {
        let mut net = concentrator_line(true);
        advertise(&mut net, true);

        assert_eq!(
            net.confirm_for(0, RequestHandle(60)),
            Some(NwkConfirm::RouteDiscovery {
                status: NwkStatus::Success
            })
        );
        assert_eq!(many_to_one_requests(&net), 1 + usize::from(INITIAL_RREQ_RETRIES));

        let at_b = net.nodes[1].routes().find(A).unwrap();
        assert_eq!(at_b.next_hop, A);
        assert_eq!(at_b.status, RouteStatus::Active);
        assert!(at_b.many_to_one);
        assert!(at_b.route_record_required);

        let at_c = net.nodes[2].routes().find(A).unwrap();
        assert_eq!(at_c.next_hop, B);
        assert!(at_c.many_to_one);
        assert!(at_c.route_record_required);
        // Nobody answers a many-to-one request
        assert!(net
            .sent_commands(2)
            .iter()
            .all(|(_, cmd)| !matches!(cmd, NwkCommand::RouteReply(_))));
    }

    #[test]
    fn test_route_record_precedes_first_data() {
        let mut net = concentrator_line(true);
        advertise(&mut net, true);
        send_to_concentrator(&mut net, 2, b"meter");

        assert_eq!(
            net.confirm_for(2, RequestHandle(61)),
            Some(NwkConfirm::Data {
                status: NwkStatus::Success
            })
        );
        let events = net.events(0);
        let record = events
            .iter()
            .position(|e| matches!(e, Event::RouteRecord { src, relays } if *src == C && relays.as_slice() == [B]))
            .expect("route record from C");
        let data = events
            .iter()
            .position(|e| matches!(e, Event::Data { src, payload, .. } if *src == C && payload.as_slice() == b"meter"))
            .expect("data from C");
        assert!(record < data);
        assert!(!net.nodes[2].routes().find(A).unwrap().route_record_required);

        // Only the first packet is preceded by a record
        send_to_concentrator(&mut net, 2, b"again");
        let records = net
            .events(0)
            .iter()
            .filter(|e| matches!(e, Event::RouteRecord { .. }))
            .count();
        assert_eq!(records, 1);
    }

    #[test]
    fn test_many_to_one_route_survives_link_failure() {
        let mut net = concentrator_line(false);
        advertise(&mut net, false);
        net.unlink(0, 1);
        send_to_concentrator(&mut net, 2, b"lost");

        let at_b = net.nodes[1].routes().find(A).unwrap();
        assert_eq!(at_b.status, RouteStatus::Active);
        assert!(at_b.many_to_one);
        assert!(net.events(1).iter().any(|e| matches!(
            e,
            Event::Status { addr, code: NetworkStatusCode::ManyToOneRouteFailure } if *addr == A
        )));

        let statuses: Vec<_> = net
            .sent_commands(1)
            .into_iter()
            .filter_map(|(h, cmd)| match cmd {
                NwkCommand::NetworkStatus(s) => Some((h.dst, s.code, s.target)),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![(ShortAddr::ALL_ROUTERS, NetworkStatusCode::ManyToOneRouteFailure, A)]
        );
        // C keeps its many-to-one route after hearing the status
        assert!(net.nodes[2].routes().find(A).is_some_and(|r| r.many_to_one));
    }

    #[test]
    fn test_concentrator_rediscovers_around_failed_relay() {
        // A reaches B directly and through D; C only hears B
        let mut net = Net::new();
        let a = net.add(concentrator(false), 0xA0A0_0000_0000_0001);
        let b = net.add(config(NwkConfig::router()), 0xB0B0_0000_0000_0002);
        let d = net.add(config(NwkConfig::router()), 0xD0D0_0000_0000_0004);
        let c = net.add(config(NwkConfig::router()), 0xC0C0_0000_0000_0003);
        net.link(a, b);
        net.link(a, d);
        net.link(b, d);
        net.link(b, c);
        net.form(a);
        net.associate(b);
        net.associate(d);
        net.open_router(b);
        net.associate(c);
        let d_addr = net.nodes[d].nib().short_addr();
        assert_eq!(d_addr, ShortAddr(0x0020));

        advertise(&mut net, false);
        let advertised = many_to_one_requests(&net);
        assert_eq!(net.nodes[b].routes().find(A).map(|r| r.next_hop), Some(A));

        net.unlink(a, b);
        send_to_concentrator(&mut net, c, b"lost");

        // B's status reached A through D, and A advertised again
        assert!(net.events(a).iter().any(|e| matches!(
            e,
            Event::Status { addr, code: NetworkStatusCode::ManyToOneRouteFailure } if *addr == A
        )));
        assert_eq!(many_to_one_requests(&net), 2 * advertised);

        let at_b = net.nodes[b].routes().find(A).unwrap();
        assert_eq!(at_b.next_hop, d_addr);
        assert!(at_b.many_to_one);

        send_to_concentrator(&mut net, c, b"found");
        assert!(net
            .events(a)
            .iter()
            .any(|e| matches!(e, Event::Data { src, payload, .. } if *src == C && payload.as_slice() == b"found")));
    }
}

mod delivery_tests {
    use super::harness::{config, pair, Event, MacCall, Net, LQI};
    use q_common::{DeviceType, ExtAddr, NetworkKey, NwkConfig, Result, ShortAddr};
    use q_nwk::command::{NetworkStatusCode, NwkCommand};
    use q_nwk::frame::FrameBuf;
    use q_nwk::security::SecurityMaterialSet;
    use q_nwk::{
        DataRequest, NwkConfirm, NwkHeader, NwkStatus, RequestHandle, SecurityMaterial, SecurityProvider,
    };

    const A: ShortAddr = ShortAddr(0x0000);
    const B: ShortAddr = ShortAddr(0x0001);

    fn data_to(dst: ShortAddr, security: bool, payload: &[u8]) -> DataRequest<'_> {
        DataRequest {
            dst,
            radius: 0,
            discover_route: false,
            security,
            multicast: false,
            payload,
        }
    }

    fn mac_data_calls(net: &Net<impl SecurityProvider + Clone>, i: usize) -> usize {
        net.nodes[i]
            .mac()
            .history
            .iter()
            .filter(|(_, c)| matches!(c, MacCall::Data { .. }))
            .count()
    }

    fn data_from(events: &[Event], from: ShortAddr) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, Event::Data { src, .. } if *src == from))
            .count()
    }

    /// Secures exactly the frames whose header asks for it; the cipher is a no-op
    #[derive(Debug, Clone, Copy, Default)]
    struct HeaderSecurity;

    impl SecurityProvider for HeaderSecurity {
        fn is_encryption_required(&self, header: &NwkHeader) -> bool {
            header.security
        }

        fn encrypt_output_packet(
            &mut self,
            _material: &SecurityMaterial,
            _src_ext: ExtAddr,
            _header_len: usize,
            _frame: &mut FrameBuf,
        ) -> Result<()> {
            Ok(())
        }

        fn is_decryption_required(&self, header: &NwkHeader) -> bool {
            header.security
        }

        fn decrypt_input_packet(
            &mut self,
            _keys: &SecurityMaterialSet,
            _header_len: usize,
            _frame: &mut FrameBuf,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_data_to_own_address_loops_back() {
        let mut net = pair();
        let sent_before = mac_data_calls(&net, 0);
        net.nodes[0].data_request(RequestHandle(70), &data_to(A, false, b"self")).unwrap();
        net.pump();

        assert_eq!(
            net.confirm_for(0, RequestHandle(70)),
            Some(NwkConfirm::Data {
                status: NwkStatus::Success
            })
        );
        assert!(net.events(0).iter().any(|e| matches!(
            e,
            Event::Data { src, dst, payload } if *src == A && *dst == A && payload.as_slice() == b"self"
        )));
        assert_eq!(mac_data_calls(&net, 0), sent_before);
        assert_eq!(data_from(net.events(1), A), 0);
    }

    #[test]
    fn test_secured_data_needs_active_key() {
        let mut net = Net::with_security(HeaderSecurity);
        let a = net.add(config(NwkConfig::coordinator()), 0xA0A0_0000_0000_0001);
        let b = net.add(config(NwkConfig::router()), 0xB0B0_0000_0000_0002);
        net.link(a, b);
        net.form(a);
        net.associate(b);

        let sent_before = mac_data_calls(&net, a);
        net.nodes[a].data_request(RequestHandle(71), &data_to(B, true, b"k")).unwrap();
        net.pump();
        assert_eq!(
            net.confirm_for(a, RequestHandle(71)),
            Some(NwkConfirm::Data { status: NwkStatus::NoKey })
        );
        assert_eq!(mac_data_calls(&net, a), sent_before);
        assert_eq!(data_from(net.events(b), A), 0);

        net.nodes[a]
            .install_key(SecurityMaterial::new(1, NetworkKey::new([0x5A; 16])))
            .unwrap();
        net.nodes[a].activate_key(1).unwrap();
        net.nodes[a].data_request(RequestHandle(72), &data_to(B, true, b"k")).unwrap();
        net.pump();
        assert_eq!(
            net.confirm_for(a, RequestHandle(72)),
            Some(NwkConfirm::Data {
                status: NwkStatus::Success
            })
        );
        assert_eq!(data_from(net.events(b), A), 1);
    }

    #[test]
    fn test_frame_failing_unsecure_is_dropped() {
        let mut net = pair();
        let mut header = NwkHeader::data(A, B, 5, 90);
        header.security = true;
        net.inject(0, B, LQI, &header, b"sealed");
        assert_eq!(data_from(net.events(0), B), 0);
        assert!(net.nodes[0].log().contains("nwk.sec", "unsecure from"));

        // The same frame in the clear is delivered
        header.security = false;
        header.sequence = 91;
        net.inject(0, B, LQI, &header, b"plain");
        assert_eq!(data_from(net.events(0), B), 1);
    }

    #[test]
    fn test_address_claimed_twice_is_reported() {
        let mut net = pair();
        let mut header = NwkHeader::data(ShortAddr::ALL_DEVICES, B, 1, 92);
        header.src_ext = Some(ExtAddr(0xBAD0_0000_0000_0001));
        net.inject(0, B, LQI, &header, b"who");

        assert!(net.events(0).iter().any(|e| matches!(
            e,
            Event::Status { addr, code: NetworkStatusCode::AddressConflict } if *addr == B
        )));
        assert!(net.sent_commands(0).iter().any(|(h, cmd)| {
            h.dst == ShortAddr::RX_ON_WHEN_IDLE
                && matches!(cmd, NwkCommand::NetworkStatus(s)
                    if s.code == NetworkStatusCode::AddressConflict && s.target == B)
        }));
        // The first binding stands
        assert_eq!(net.nodes[0].address_map().ext_of(B), Some(net.nodes[1].mac().ext));
    }

    #[test]
    fn test_own_address_used_elsewhere_is_reported() {
        let mut net = pair();
        let mut header = NwkHeader::data(ShortAddr::ALL_DEVICES, B, 1, 93);
        header.src_ext = Some(ExtAddr(0xBAD0_0000_0000_0002));
        net.inject(1, A, LQI, &header, b"twin");

        assert!(net.events(1).iter().any(|e| matches!(
            e,
            Event::Status { addr, code: NetworkStatusCode::AddressConflict } if *addr == B
        )));
        // Our own frames coming back are still ignored
        assert_eq!(data_from(net.events(1), B), 0);
    }

    #[test]
    fn test_link_status_adds_router_neighbor() {
        let mut net = Net::new();
        let a = net.add(config(NwkConfig::coordinator()), 0xA6);
        let b = net.add(config(NwkConfig::router()), 0xB6);
        let mut periodic = config(NwkConfig::router());
        periodic.link_status_period_ms = 15_000;
        let d = net.add(periodic, 0xD6);
        net.link(a, b);
        net.link(a, d);
        net.link(b, d);
        net.form(a);
        net.associate(b);
        net.associate(d);
        net.open_router(d);
        let d_addr = net.nodes[d].nib().short_addr();
        assert!(net.nodes[b].neighbors().find_short(d_addr).is_none());

        net.advance(15_000);

        let statuses = net
            .sent_commands(d)
            .into_iter()
            .filter(|(h, cmd)| h.radius == 1 && matches!(cmd, NwkCommand::LinkStatus(_)))
            .count();
        assert!(statuses >= 1);
        let learned = net.nodes[b].neighbors().find_short(d_addr).unwrap();
        assert_eq!(learned.device_type, DeviceType::Router);
        assert_eq!(learned.ext, net.nodes[d].mac().ext);
        assert_eq!(learned.age, 0);
        // D lists only its parent, so B has no outgoing cost yet
        assert_eq!(learned.outgoing_cost, 0);
    }
}
