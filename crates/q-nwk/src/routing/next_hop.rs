// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Next hop selection

use q_common::{DeviceType, ShortAddr};

use crate::addressing::AddressAllocator;
use crate::neighbor::NeighborTable;
use crate::routing::{RouteStatus, RoutingTable};

/// How a frame leaves this device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    /// Addressed to us: loop back into the receive path
    Local,
    /// Broadcast to the neighborhood
    Broadcast,
    /// Multicast flood; `deliver` when we are a group member
    Multicast {
        /// Also deliver locally
        deliver: bool,
    },
    /// Active routing table entry
    Mesh,
    /// Destination is a neighbor
    Neighbor,
    /// Hierarchical routing through the address tree
    Tree,
    /// End device: everything goes to the parent
    Parent,
    /// No route yet; start a route discovery
    DiscoveryRequired,
    /// Cannot be routed
    Unroutable,
}

/// Result of [`compute_next_hop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextHop {
    /// Chosen method
    pub method: RouteMethod,
    /// MAC destination (0xFFFF for broadcasts, unassigned when none)
    pub next_hop: ShortAddr,
}

impl NextHop {
    const fn new(method: RouteMethod, next_hop: ShortAddr) -> Self {
        Self { method, next_hop }
    }

    const fn none(method: RouteMethod) -> Self {
        Self::new(method, ShortAddr::UNASSIGNED)
    }
}

/// Frame being routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextHopQuery {
    /// NWK destination (group id for multicast)
    pub dst: ShortAddr,
    /// NWK source
    pub src: ShortAddr,
    /// MAC source of a relayed frame (unassigned when originated here)
    pub prev_hop: ShortAddr,
    /// Destination is a multicast group
    pub multicast: bool,
    /// We are a member of that group
    pub multicast_member: bool,
    /// Remaining radius
    pub hops_budget: u8,
    /// Route discovery allowed for this frame
    pub discover_route: bool,
}

/// Routing state consulted by [`compute_next_hop`]
#[derive(Clone, Copy)]
pub struct RoutingContext<'a> {
    /// Our address
    pub own: ShortAddr,
    /// Our tree depth
    pub depth: u8,
    /// Our role
    pub device_type: DeviceType,
    /// Mesh routing enabled
    pub mesh_routing: bool,
    /// Tree routing enabled
    pub use_tree_routing: bool,
    /// Our parent, if joined through one
    pub parent: Option<ShortAddr>,
    /// Routing table
    pub routes: &'a RoutingTable,
    /// Neighbor table
    pub neighbors: &'a NeighborTable,
    /// Tree address arithmetic
    pub allocator: &'a AddressAllocator,
}

/// Choose how to forward a frame
///
/// Priority: multicast, loopback, broadcast, radius, end device parent,
/// active route, neighbor, route discovery, tree, unroutable.
#[must_use]
pub fn compute_next_hop(ctx: &RoutingContext<'_>, query: &NextHopQuery) -> NextHop {
    if query.multicast {
        return NextHop::new(
            RouteMethod::Multicast {
                deliver: query.multicast_member,
            },
            ShortAddr::ALL_DEVICES,
        );
    }
    if query.dst == ctx.own {
        return NextHop::new(RouteMethod::Local, ctx.own);
    }
    if query.dst.is_broadcast() {
        return NextHop::new(RouteMethod::Broadcast, ShortAddr::ALL_DEVICES);
    }
    if query.hops_budget == 0 {
        return NextHop::none(RouteMethod::Unroutable);
    }
    if !ctx.device_type.is_router_capable() {
        return match ctx.parent {
            Some(parent) => NextHop::new(RouteMethod::Parent, parent),
            None => NextHop::none(RouteMethod::Unroutable),
        };
    }

    if let Some(entry) = ctx.routes.find(query.dst) {
        match entry.status {
            RouteStatus::Active if entry.next_hop != query.prev_hop => {
                return NextHop::new(RouteMethod::Mesh, entry.next_hop);
            }
            RouteStatus::DiscoveryUnderway if ctx.mesh_routing => {
                return NextHop::none(RouteMethod::DiscoveryRequired);
            }
            _ => {}
        }
    }

    if ctx
        .neighbors
        .find_short(query.dst)
        .is_some_and(|n| !n.potential_parent)
    {
        return NextHop::new(RouteMethod::Neighbor, query.dst);
    }

    if ctx.mesh_routing && query.discover_route {
        return NextHop::none(RouteMethod::DiscoveryRequired);
    }

    if ctx.use_tree_routing {
        if let Some(hop) = ctx.allocator.tree_next_hop(ctx.own, ctx.depth, query.dst) {
            return NextHop::new(RouteMethod::Tree, hop);
        }
        if let Some(parent) = ctx.parent.filter(|&p| p != query.prev_hop) {
            return NextHop::new(RouteMethod::Tree, parent);
        }
    }

    NextHop::none(RouteMethod::Unroutable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::NeighborEntry;
    use crate::routing::RouteEntry;
    use q_common::{ExtAddr, NwkConfig};

    struct Fixture {
        routes: RoutingTable,
        neighbors: NeighborTable,
        allocator: AddressAllocator,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                routes: RoutingTable::new(),
                neighbors: NeighborTable::new(),
                allocator: AddressAllocator::new(&NwkConfig::router().with_tree(22, 6, 5)),
            }
        }

        fn ctx(&self, own: u16, depth: u8, mesh: bool) -> RoutingContext<'_> {
            RoutingContext {
                own: ShortAddr(own),
                depth,
                device_type: DeviceType::Router,
                mesh_routing: mesh,
                use_tree_routing: true,
                parent: Some(ShortAddr(0)),
                routes: &self.routes,
                neighbors: &self.neighbors,
                allocator: &self.allocator,
            }
        }
    }

    fn query(dst: u16) -> NextHopQuery {
        NextHopQuery {
            dst: ShortAddr(dst),
            src: ShortAddr(1),
            prev_hop: ShortAddr::UNASSIGNED,
            multicast: false,
            multicast_member: false,
            hops_budget: 10,
            discover_route: true,
        }
    }

    #[test]
    fn test_loopback_and_broadcast() {
        let fx = Fixture::new();
        let ctx = fx.ctx(1, 1, true);
        assert_eq!(compute_next_hop(&ctx, &query(1)).method, RouteMethod::Local);
        assert_eq!(compute_next_hop(&ctx, &query(0xFFFC)).method, RouteMethod::Broadcast);
    }

    #[test]
    fn test_mesh_entry_wins() {
        let mut fx = Fixture::new();
        fx.routes
            .set_active(RouteEntry::active(ShortAddr(0x4000), ShortAddr(0x0002), 2))
            .unwrap();
        let hop = compute_next_hop(&fx.ctx(1, 1, true), &query(0x4000));
        assert_eq!(hop, NextHop::new(RouteMethod::Mesh, ShortAddr(0x0002)));
    }

    #[test]
    fn test_discovery_required_without_route() {
        let fx = Fixture::new();
        let hop = compute_next_hop(&fx.ctx(1, 1, true), &query(0x4000));
        assert_eq!(hop.method, RouteMethod::DiscoveryRequired);
        let mut q = query(0x4000);
        q.discover_route = false;
        // Falls back to the parent through the tree
        assert_eq!(compute_next_hop(&fx.ctx(1, 1, true), &q).method, RouteMethod::Tree);
    }

    #[test]
    fn test_neighbor_direct() {
        let mut fx = Fixture::new();
        fx.neighbors
            .add_or_update(NeighborEntry::new(ShortAddr(0x0777), ExtAddr(7), DeviceType::Router))
            .unwrap();
        let hop = compute_next_hop(&fx.ctx(1, 1, true), &query(0x0777));
        assert_eq!(hop, NextHop::new(RouteMethod::Neighbor, ShortAddr(0x0777)));
    }

    #[test]
    fn test_tree_descendant() {
        let fx = Fixture::new();
        // 0x030A sits in the block of 0x0002's sixth router child
        let hop = compute_next_hop(&fx.ctx(2, 2, false), &query(0x030A));
        assert_eq!(hop, NextHop::new(RouteMethod::Tree, ShortAddr(0x030A)));
        let hop = compute_next_hop(&fx.ctx(2, 2, false), &query(0x0310));
        assert_eq!(hop, NextHop::new(RouteMethod::Tree, ShortAddr(0x030A)));
    }

    #[test]
    fn test_zero_radius_unroutable() {
        let fx = Fixture::new();
        let mut q = query(0x4000);
        q.hops_budget = 0;
        assert_eq!(compute_next_hop(&fx.ctx(1, 1, true), &q).method, RouteMethod::Unroutable);
    }
}
