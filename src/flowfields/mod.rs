//! Flowfields are a means of handling pathfinding for a crowd of actors.
//!
//! [Fixing Pathfinding Once and For All](https://web.archive.org/web/20150905073624/http://www.ai-blog.net/archives/000152.html)
//!
//! [jdxdev](https://www.jdxdev.com/blog/2020/05/03/flowfields/)
//!
//! [leifnode](https://leifnode.com/2013/12/flow-field-pathfinding/)
//!
//! Rather than searching a path per actor a single field is solved towards a
//! destination and every actor reads its heading from the cell it stands in.
//!
//! Two kinds of world are supported:
//!
//! * Dense - a 2D grid of `columns x rows` cells laid over the `XY` plane, solved synchronously on demand
//! * Voxel - a sparse 3D world of fixed size chunks, solved on background workers and double buffered
//!
//! Definitions:
//!
//! * Weight field - 8-bit field where `0` is impassable and `1..=255` scales how quickly a cell can be crossed, `255` being open ground
//! * Integration field - the accumulated cost of reaching the destination from every cell
//! * Flow field - a unit direction per cell pointing down the integration field towards the destination
//!
//! ```text
//!  weights                 integration             flow
//!  _________________       _________________       _________________
//! |255|255| 0 |255|       | 5 | 4 | ∞ | 0 |       | → | ↓ | x | D |
//! |255|255|255|255|  ──▶  | 4 | 3 | 2 | 1 |  ──▶  | → | → | → | ↑ |
//! |___|___|___|___|       |___|___|___|___|       |___|___|___|___|
//! ```
//!

pub mod buffers;
pub mod dense;
pub mod fields;
pub mod scheduler;
pub mod settings;
pub mod utilities;
pub mod voxels;
