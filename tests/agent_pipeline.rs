//! Tests that run whole agents against small road networks.

use traffic_agent::{
    math::{Arc2d, LineSegment2d, Point2d, Vector2d},
    Agent, AgentAttributes, AgentParams, Behavior, LaneId, MergePhase, ObjectId, ObjectKind,
    ObjectState, PathElement, RoadId, RoadPosition, RngStreamPool, RoutePath, TurnSignal,
    WorldSnapshot,
};

const ATTRIBUTES: AgentAttributes = AgentAttributes {
    width: 2.0,
    length: 4.5,
};

fn car(position: RoadPosition, vel: f64) -> ObjectState {
    ObjectState {
        kind: ObjectKind::Vehicle,
        position,
        vel,
        acc: 0.0,
        width: ATTRIBUTES.width,
        length: ATTRIBUTES.length,
        signal: TurnSignal::Off,
    }
}

fn on_lane(road: RoadId, lane: LaneId, dist: f64) -> RoadPosition {
    RoadPosition::Road {
        road,
        lane,
        dist,
        lateral: 0.0,
    }
}

fn line(x0: f64, x1: f64) -> LineSegment2d {
    LineSegment2d::from_ends(Point2d::new(x0, 0.0), Point2d::new(x1, 0.0))
}

/// A single straight lane 1 km long.
struct Straight {
    world: WorldSnapshot,
    path: RoutePath,
    road: RoadId,
    lane: LaneId,
}

impl Straight {
    fn new(speed_limit: f64) -> Self {
        let mut world = WorldSnapshot::new();
        let road = world.add_road(speed_limit, false);
        let lane = world.add_lane(road, 1000.0);
        let mut path = RoutePath::new();
        path.append(PathElement::Lane { road, lane }, &line(0.0, 1000.0));
        Self {
            world,
            path,
            road,
            lane,
        }
    }

    fn at(&self, dist: f64) -> RoadPosition {
        on_lane(self.road, self.lane, dist)
    }

    /// Moves an object along the lane as a host would after applying `accel`.
    fn advance(&mut self, id: ObjectId, accel: f64, dt: f64) {
        let Some(obj) = self.world.object_mut(id) else {
            return;
        };
        obj.vel = f64::max(obj.vel + accel * dt, 0.0);
        obj.acc = accel;
        if let RoadPosition::Road { dist, .. } = &mut obj.position {
            *dist += obj.vel * dt;
        }
    }
}

#[test]
fn free_road_cruises_to_speed_limit() {
    let pool = RngStreamPool::new(1);
    let mut net = Straight::new(20.0);
    let id = net.world.add_object(car(net.at(10.0), 10.0));
    let mut agent = Agent::new(id, ATTRIBUTES, AgentParams::default(), &pool);

    let decision = agent.step(&net.world, &net.path, 0.1).unwrap();
    assert_eq!(decision.behavior, Behavior::FreeDrive);
    assert!(decision.accel > 0.0);
    assert_eq!(agent.curvature().get_advisory(-0.3), None);
    assert_eq!(agent.lead(), None);
}

#[test]
fn brakes_for_stopped_lead() {
    let pool = RngStreamPool::new(2);
    let mut net = Straight::new(25.0);
    let id = net.world.add_object(car(net.at(10.0), 20.0));
    let lead = net.world.add_object(car(net.at(60.0), 0.0));
    let mut agent = Agent::new(id, ATTRIBUTES, AgentParams::default(), &pool);

    let decision = agent.step(&net.world, &net.path, 0.1).unwrap();
    assert_eq!(agent.lead(), Some(lead));
    assert_eq!(decision.behavior, Behavior::Follow);
    assert!(decision.accel < 0.0);
    assert!(decision.accel >= agent.params().follow.emergency.neg_acc_clip);
}

#[test]
fn slows_for_a_sharp_curve() {
    let pool = RngStreamPool::new(3);
    let mut world = WorldSnapshot::new();
    let road = world.add_road(25.0, false);
    let lane = world.add_lane(road, 150.0);
    let bend_road = world.add_road(25.0, false);
    let bend_lane = world.add_lane(bend_road, 50.0);
    let mut path = RoutePath::new();
    path.append(PathElement::Lane { road, lane }, &line(0.0, 150.0));
    path.append(
        PathElement::Lane {
            road: bend_road,
            lane: bend_lane,
        },
        &Arc2d::new(Point2d::new(150.0, 0.0), Vector2d::new(1.0, 0.0), 30.0, 50.0, true),
    );
    let id = world.add_object(car(on_lane(road, lane, 0.0), 20.0));
    let mut agent = Agent::new(id, ATTRIBUTES, AgentParams::default(), &pool);

    let decision = agent.step(&world, &path, 0.1).unwrap();
    assert_eq!(decision.behavior, Behavior::Curvature);
    assert!(decision.accel < -0.3);
    let (speed, dist) = agent.curvature().get_advisory(-0.3).unwrap();
    assert!(speed < 10.0);
    assert!(dist > 140.0 && dist < 160.0, "dist = {}", dist);
}

#[test]
fn merges_into_an_empty_highway() {
    let pool = RngStreamPool::new(4);
    let mut world = WorldSnapshot::new();
    let ramp_road = world.add_road(25.0, true);
    let highway = world.add_road(30.0, false);
    let exit = world.add_road(30.0, false);
    let ramp_lane = world.add_lane(ramp_road, 200.0);
    let highway_lane = world.add_lane(highway, 500.0);
    let exit_lane = world.add_lane(exit, 500.0);
    let junction = world.add_intersection();
    let ramp = world.add_corridor(junction, ramp_lane, exit_lane, 100.0);
    let target = world.add_corridor(junction, highway_lane, exit_lane, 100.0);
    world.add_overlap(
        ramp,
        traffic_agent::Interval::new(60.0, 100.0),
        target,
        traffic_agent::Interval::new(60.0, 100.0),
    );
    world.set_merge(ramp_lane, ramp, target);

    let mut path = RoutePath::new();
    path.append(
        PathElement::Lane {
            road: ramp_road,
            lane: ramp_lane,
        },
        &line(0.0, 200.0),
    );
    path.append(PathElement::Corridor(ramp), &line(200.0, 300.0));
    path.append(
        PathElement::Lane {
            road: exit,
            lane: exit_lane,
        },
        &line(300.0, 800.0),
    );

    let id = world.add_object(car(on_lane(ramp_road, ramp_lane, 180.0), 20.0));
    // A vehicle ahead on the ramp is ignored while merging.
    world.add_object(car(on_lane(ramp_road, ramp_lane, 195.0), 5.0));
    let mut agent = Agent::new(id, ATTRIBUTES, AgentParams::default(), &pool);

    assert!(agent.step(&world, &path, 0.1).is_some());
    assert_eq!(agent.merge_session().phase, MergePhase::GapSearch);
    assert_eq!(agent.lead(), None);

    let decision = agent.step(&world, &path, 0.1).unwrap();
    assert_eq!(agent.merge_session().phase, MergePhase::Track);
    assert_eq!(agent.merge_session().gap_leader, None);
    assert!(decision.accel <= agent.params().merge.free_accel);

    // Once on the destination lane the merge is over.
    if let Some(obj) = world.object_mut(id) {
        obj.position = on_lane(exit, exit_lane, 5.0);
    }
    agent.step(&world, &path, 0.1);
    assert_eq!(agent.merge_session().phase, MergePhase::Off);
}

#[test]
fn same_seed_gives_same_trajectory() {
    let run = || {
        let pool = RngStreamPool::new(42);
        let mut net = Straight::new(20.0);
        let id = net.world.add_object(car(net.at(0.0), 0.0));
        let lead = net.world.add_object(car(net.at(80.0), 12.0));
        let mut agent = Agent::new(id, ATTRIBUTES, AgentParams::default(), &pool);
        let mut accels = vec![];
        for _ in 0..200 {
            let accel = agent
                .step(&net.world, &net.path, 0.1)
                .map_or(0.0, |d| d.accel);
            net.advance(id, accel, 0.1);
            net.advance(lead, 0.0, 0.1);
            accels.push(accel);
        }
        accels
    };
    let first = run();
    assert_eq!(first, run());
    assert!(first.iter().all(|a| a.is_finite()));
}

#[test]
fn follower_never_hits_a_braking_lead() {
    let pool = RngStreamPool::new(7);
    let mut net = Straight::new(25.0);
    let id = net.world.add_object(car(net.at(0.0), 20.0));
    let lead = net.world.add_object(car(net.at(45.0), 20.0));
    let mut agent = Agent::new(id, ATTRIBUTES, AgentParams::default(), &pool);

    for frame in 0..300 {
        let accel = agent
            .step(&net.world, &net.path, 0.1)
            .map_or(0.0, |d| d.accel);
        net.advance(id, accel, 0.1);
        // The lead brakes to a stop after 2 s.
        let lead_accel = if frame >= 20 { -3.0 } else { 0.0 };
        net.advance(lead, lead_accel, 0.1);

        let own = net.world.object_mut(id).map(|o| o.position.dist()).unwrap();
        let ahead = net.world.object_mut(lead).map(|o| o.position.dist()).unwrap();
        assert!(ahead - own > ATTRIBUTES.length, "collision at frame {}", frame);
    }
}

#[test]
fn streams_are_returned_to_the_pool() {
    let pool = RngStreamPool::new(5);
    let mut net = Straight::new(20.0);
    let a = net.world.add_object(car(net.at(0.0), 0.0));
    let b = net.world.add_object(car(net.at(50.0), 0.0));
    let first = Agent::new(a, ATTRIBUTES, AgentParams::default(), &pool);
    let second = Agent::new(b, ATTRIBUTES, AgentParams::default(), &pool);
    assert_eq!((first.rng_stream(), second.rng_stream()), (0, 1));
    first.retire(&pool);
    assert_eq!(pool.in_use(), 1);
    let third = Agent::new(a, ATTRIBUTES, AgentParams::default(), &pool);
    assert_eq!(third.rng_stream(), 0);
}

#[test]
fn missing_object_gives_no_decision() {
    let pool = RngStreamPool::new(6);
    let mut net = Straight::new(20.0);
    let id = net.world.add_object(car(net.at(0.0), 10.0));
    let mut agent = Agent::new(id, ATTRIBUTES, AgentParams::default(), &pool);
    net.world.remove_object(id);
    assert_eq!(agent.step(&net.world, &net.path, 0.1), None);
}

#[test]
fn losing_the_lead_forgets_the_held_braking() {
    let pool = RngStreamPool::new(9);
    let mut net = Straight::new(40.0);
    let id = net.world.add_object(car(net.at(10.0), 20.0));
    let stopped = net.world.add_object(car(net.at(60.0), 0.0));
    let mut agent = Agent::new(id, ATTRIBUTES, AgentParams::default(), &pool);

    let braking = agent.step(&net.world, &net.path, 0.1).unwrap();
    assert_eq!(braking.behavior, Behavior::Follow);
    assert!(braking.accel < 0.0);
    assert_eq!(agent.follow_state().old_output, Some(braking.accel));

    net.world.remove_object(stopped);
    let free = agent.step(&net.world, &net.path, 0.1).unwrap();
    assert_eq!(free.behavior, Behavior::FreeDrive);
    assert_eq!(agent.follow_state().old_output, None);

    // A new lead pulling away is followed at once, not after a stale hold.
    let faster = net.world.add_object(car(net.at(70.0), 24.0));
    let decision = agent.step(&net.world, &net.path, 0.1).unwrap();
    assert_eq!(agent.lead(), Some(faster));
    assert_eq!(decision.behavior, Behavior::Follow);
    assert!(decision.accel > 0.0);
}

#[test]
fn lane_change_resamples_the_curvature() {
    let pool = RngStreamPool::new(10);
    let mut world = WorldSnapshot::new();
    let road = world.add_road(25.0, false);
    let left = world.add_lane(road, 1000.0);
    let right = world.add_lane(road, 150.0);
    world.set_adjacent(left, right);
    let bend_road = world.add_road(25.0, false);
    let bend_lane = world.add_lane(bend_road, 60.0);
    let mut straight = RoutePath::new();
    straight.append(PathElement::Lane { road, lane: left }, &line(0.0, 1000.0));
    let mut curving = RoutePath::new();
    curving.append(PathElement::Lane { road, lane: right }, &line(0.0, 150.0));
    curving.append(
        PathElement::Lane {
            road: bend_road,
            lane: bend_lane,
        },
        &Arc2d::new(Point2d::new(150.0, 0.0), Vector2d::new(1.0, 0.0), 40.0, 60.0, false),
    );
    let id = world.add_object(car(on_lane(road, left, 100.0), 15.0));
    let mut agent = Agent::new(id, ATTRIBUTES, AgentParams::default(), &pool);

    agent.step(&world, &straight, 0.1).unwrap();
    assert!(agent.curvature().buckets().is_empty());

    world.object_mut(id).unwrap().position = on_lane(road, right, 100.0);
    agent.step(&world, &curving, 0.1).unwrap();
    let first = agent.curvature().samples().next().copied().unwrap();
    assert!((first.dist - 100.0).abs() < 1e-6, "first sample at {}", first.dist);
    assert!(!agent.curvature().buckets().is_empty());

    // The host swaps in a straight route for the same lane.
    let mut rerouted = RoutePath::new();
    rerouted.append(PathElement::Lane { road, lane: right }, &line(0.0, 150.0));
    agent.replace_route();
    agent.step(&world, &rerouted, 0.1).unwrap();
    assert!(agent.curvature().buckets().is_empty());
}
