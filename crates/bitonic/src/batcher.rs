//! Recording a stage plan into one batched submission.
//!
//! The batcher owns the recording session for the duration of one sort run.
//! Stage `i` is written to parameter slot `i` and its dispatch is bound to that
//! slot, in plan order, so the device executes the network level by level.

use crate::error::BatchError;
use crate::params::StageParameters;
use crate::planner::StagePlan;

/// Device side of a batch: parameter uploads and dispatch recording.
pub trait StageEncoder {
    /// Store `parameters` at `byte_offset` in the parameter buffer.
    fn write_parameters(&mut self, byte_offset: u64, parameters: &StageParameters);

    /// Record one dispatch of `workgroup_count` workgroups reading its
    /// parameters at `parameter_offset`.
    fn dispatch(&mut self, parameter_offset: u32, workgroup_count: u32);
}

/// Slot geometry of the parameter buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParameterLayout {
    stride: u64,
}

impl ParameterLayout {
    /// Slots padded to `alignment` bytes, the device's minimum dynamic offset
    /// alignment. An alignment of 0 or 1 packs records back to back.
    pub fn new(alignment: u32) -> Self {
        let record = std::mem::size_of::<StageParameters>() as u64;
        let alignment = u64::from(alignment.max(1));
        Self {
            stride: record.div_ceil(alignment) * alignment,
        }
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn offset(&self, slot: u32) -> u64 {
        u64::from(slot) * self.stride
    }

    /// Bytes needed for `slots` records.
    pub fn buffer_size(&self, slots: u32) -> u64 {
        self.offset(slots)
    }
}

/// Records a plan into a [`StageEncoder`], one parameter slot per stage.
pub struct DispatchBatcher<E> {
    encoder: E,
    layout: ParameterLayout,
    capacity: u32,
    next_slot: u32,
    workgroup_count: u32,
}

impl<E: StageEncoder> DispatchBatcher<E> {
    /// `capacity` must be the slot count the parameter buffer was allocated with.
    pub fn new(encoder: E, layout: ParameterLayout, capacity: u32, workgroup_count: u32) -> Self {
        Self {
            encoder,
            layout,
            capacity,
            next_slot: 0,
            workgroup_count,
        }
    }

    /// Batcher sized for exactly `plan`.
    pub fn for_plan(encoder: E, layout: ParameterLayout, plan: &StagePlan) -> Self {
        Self::new(encoder, layout, plan.stage_count(), plan.workgroup_count())
    }

    /// Write `stage` into the next slot and record its dispatch. Returns the slot.
    pub fn record(&mut self, stage: &StageParameters) -> Result<u32, BatchError> {
        let slot = self.next_slot;
        if slot >= self.capacity {
            return Err(BatchError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let offset = self.layout.offset(slot);
        let dynamic_offset =
            u32::try_from(offset).map_err(|_| BatchError::OffsetOverflow { slot })?;

        self.encoder.write_parameters(offset, stage);
        self.encoder.dispatch(dynamic_offset, self.workgroup_count);
        self.next_slot += 1;
        Ok(slot)
    }

    /// Record every stage of `plan` in order.
    pub fn record_plan(&mut self, plan: &StagePlan) -> Result<(), BatchError> {
        for stage in plan {
            self.record(stage)?;
        }
        Ok(())
    }

    pub fn recorded(&self) -> u32 {
        self.next_slot
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Close the batch and hand the session back. Every slot must be used.
    pub fn finish(self) -> Result<E, BatchError> {
        if self.next_slot != self.capacity {
            return Err(BatchError::Incomplete {
                recorded: self.next_slot,
                capacity: self.capacity,
            });
        }
        Ok(self.encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::AlgorithmVariant;
    use crate::planner::plan;

    #[derive(Default)]
    struct Recording {
        writes: Vec<(u64, StageParameters)>,
        dispatches: Vec<(u32, u32)>,
    }

    impl StageEncoder for Recording {
        fn write_parameters(&mut self, byte_offset: u64, parameters: &StageParameters) {
            self.writes.push((byte_offset, *parameters));
        }

        fn dispatch(&mut self, parameter_offset: u32, workgroup_count: u32) {
            self.dispatches.push((parameter_offset, workgroup_count));
        }
    }

    #[test]
    fn layout_pads_to_alignment() {
        assert_eq!(ParameterLayout::new(1).stride(), 8);
        assert_eq!(ParameterLayout::new(0).stride(), 8);
        assert_eq!(ParameterLayout::new(256).stride(), 256);
        assert_eq!(ParameterLayout::new(256).buffer_size(66), 66 * 256);
        assert_eq!(ParameterLayout::new(4).offset(3), 24);
    }

    #[test]
    fn slots_follow_plan_order() {
        let plan = plan(16, 2).unwrap();
        let layout = ParameterLayout::new(1);
        let mut batcher = DispatchBatcher::for_plan(Recording::default(), layout, &plan);
        batcher.record_plan(&plan).unwrap();
        let recording = batcher.finish().unwrap();

        assert_eq!(recording.writes.len(), plan.len());
        for (i, ((offset, params), (bound, groups))) in recording
            .writes
            .iter()
            .zip(&recording.dispatches)
            .enumerate()
        {
            assert_eq!(*offset, (i * std::mem::size_of::<StageParameters>()) as u64);
            assert_eq!(u64::from(*bound), *offset);
            assert_eq!(*groups, 4);
            assert_eq!(params, &plan.stages()[i]);
        }
    }

    #[test]
    fn aligned_offsets() {
        let plan = plan(64, 4).unwrap();
        let mut batcher =
            DispatchBatcher::for_plan(Recording::default(), ParameterLayout::new(256), &plan);
        batcher.record_plan(&plan).unwrap();
        let recording = batcher.finish().unwrap();
        let bound: Vec<u32> = recording.dispatches.iter().map(|(o, _)| *o).collect();
        let expected: Vec<u32> = (0..plan.stage_count()).map(|i| i * 256).collect();
        assert_eq!(bound, expected);
    }

    #[test]
    fn refuses_to_overrun_capacity() {
        let stage = StageParameters::new(4, AlgorithmVariant::LocalDisperse);
        let mut batcher =
            DispatchBatcher::new(Recording::default(), ParameterLayout::new(1), 1, 1);
        assert_eq!(batcher.record(&stage), Ok(0));
        assert_eq!(
            batcher.record(&stage),
            Err(BatchError::CapacityExceeded { capacity: 1 })
        );
        assert_eq!(batcher.recorded(), 1);
        let recording = batcher.finish().unwrap();
        assert_eq!(recording.writes.len(), 1);
    }

    #[test]
    fn unfinished_batch_is_an_error() {
        let batcher = DispatchBatcher::new(Recording::default(), ParameterLayout::new(1), 3, 1);
        assert!(matches!(
            batcher.finish(),
            Err(BatchError::Incomplete {
                recorded: 0,
                capacity: 3
            })
        ));
    }

    #[test]
    fn offset_overflow_is_reported() {
        let stage = StageParameters::new(2, AlgorithmVariant::LocalBitonicMergeSort);
        let mut batcher = DispatchBatcher::new(
            Recording::default(),
            ParameterLayout::new(1 << 31),
            4,
            1,
        );
        assert_eq!(batcher.record(&stage), Ok(0));
        assert_eq!(batcher.record(&stage), Ok(1));
        assert_eq!(
            batcher.record(&stage),
            Err(BatchError::OffsetOverflow { slot: 2 })
        );
    }
}
